//! Common test utilities for integration tests
//!
//! Provides shared fixtures used across multiple integration test files:
//! a small capital-cities dataset and scripted task/reflection models.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use prompt_evolve::adapters::llm::ScriptedModelClient;
use prompt_evolve::domain::models::{Example, OptimizerConfig, RunRequest};

pub const CAPITALS: [(&str, &str); 8] = [
    ("France", "Paris"),
    ("Spain", "Madrid"),
    ("Italy", "Rome"),
    ("Japan", "Tokyo"),
    ("Peru", "Lima"),
    ("Kenya", "Nairobi"),
    ("Chile", "Santiago"),
    ("Egypt", "Cairo"),
];

pub fn capital(country: &str) -> &'static str {
    CAPITALS
        .iter()
        .find(|(c, _)| *c == country)
        .map_or("unknown", |(_, capital)| capital)
}

/// The wordy answer a weak instruction produces.
pub fn verbose_answer(country: &str) -> String {
    format!(
        "Well, the capital city of {country} is {}, as far as I know",
        capital(country)
    )
}

pub fn examples(prefix: &str, countries: &[&str]) -> Vec<Example> {
    countries
        .iter()
        .enumerate()
        .map(|(i, c)| Example::new(format!("{prefix}{i}"), *c, capital(c)))
        .collect()
}

pub fn request(seed: &str) -> RunRequest {
    RunRequest {
        name: "capitals".to_string(),
        seed_instruction: seed.to_string(),
        feedback_pool: examples("f", &["France", "Spain", "Italy", "Japan"]),
        validation_set: examples("v", &["Peru", "Kenya", "Chile"]),
    }
}

/// Deterministic single-worker configuration.
pub fn config(max_iterations: u64) -> OptimizerConfig {
    OptimizerConfig {
        max_iterations,
        minibatch_size: 2,
        concurrency: 1,
        seed: Some(7),
        ..OptimizerConfig::default()
    }
}

/// Task model that answers tersely only when told to be concise.
pub fn concise_task_model() -> ScriptedModelClient {
    ScriptedModelClient::from_fn("task", |instruction, input| {
        if instruction.contains("concisely") {
            Ok(capital(input).to_string())
        } else {
            Ok(verbose_answer(input))
        }
    })
}

/// Reflection model that always proposes `instruction`.
pub fn fixed_reflection_model(instruction: &str) -> ScriptedModelClient {
    ScriptedModelClient::new("reflect").with_default_reply(format!("```\n{instruction}\n```"))
}

/// Reflection model that proposes each of `proposals` in turn, repeating
/// the last one, and answers merge requests with `merged`.
pub fn sequenced_reflection_model(proposals: Vec<&'static str>, merged: &'static str) -> ScriptedModelClient {
    let next = Arc::new(AtomicUsize::new(0));
    ScriptedModelClient::from_fn("reflect", move |_, input| {
        if input.starts_with("Two instructions") {
            return Ok(format!("```\n{merged}\n```"));
        }
        let i = next.fetch_add(1, Ordering::SeqCst).min(proposals.len() - 1);
        Ok(format!("```\n{}\n```", proposals[i]))
    })
}

/// Initialize a test subscriber once per binary.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
