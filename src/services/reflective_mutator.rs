//! Reflective mutator.
//!
//! Asks the reflection model to read a parent instruction together with the
//! diagnostics it earned on a minibatch, and to write an improved
//! instruction. The same model can merge two frontier instructions into one.
//! The new instruction is taken from the first fenced block in the reply, or
//! the whole reply when there is no fence.

use std::sync::Arc;

use crate::domain::errors::{DomainResult, OptimizerError};
use crate::domain::models::Candidate;
use crate::domain::ports::ModelClient;

const REFLECTION_SYSTEM_PROMPT: &str = "You improve instructions for a language model. \
You read an instruction, the inputs it was run on, and feedback about its outputs, \
then write a better instruction. Reply with the new instruction inside a ``` block.";

const MUTATION_TEMPLATE: &str = "The assistant was given the following instruction:
```
{instruction}
```

Here are examples of inputs it handled, with scores and feedback on its outputs:

{feedback}

Write a new instruction for the assistant. Keep what already works, address every \
failure the feedback points out, and add any domain-specific facts the feedback reveals. \
Be specific and actionable. Reply with the new instruction inside a ``` block.";

const MERGE_TEMPLATE: &str = "Two instructions were each successful on different examples.

Instruction 1 (mean score {first_score}):
```
{first}
```

Instruction 2 (mean score {second_score}):
```
{second}
```

Write one instruction that combines the strengths of both. Keep what makes each \
effective and resolve conflicts in favour of accuracy. Reply with the merged \
instruction inside a ``` block.";

/// Produces child instructions through the reflection model.
#[derive(Clone)]
pub struct ReflectiveMutator {
    reflection_model: Arc<dyn ModelClient>,
}

impl ReflectiveMutator {
    pub fn new(reflection_model: Arc<dyn ModelClient>) -> Self {
        Self { reflection_model }
    }

    /// Rewrite `parent` in light of `feedback_text`.
    ///
    /// # Errors
    /// - `ModelUnavailable` - the reflection call failed
    /// - `InvalidMutation` - the reply held no usable instruction
    pub async fn mutate(&self, parent: &Candidate, feedback_text: &str) -> DomainResult<String> {
        let input = MUTATION_TEMPLATE
            .replace("{instruction}", &parent.instruction)
            .replace("{feedback}", feedback_text);
        let reply = self
            .reflection_model
            .generate(REFLECTION_SYSTEM_PROMPT, &input)
            .await?;
        let child = extract_instruction(&reply)?;
        if child == parent.instruction.trim() {
            return Err(OptimizerError::InvalidMutation(
                "reflection returned the parent instruction unchanged".to_string(),
            ));
        }
        tracing::debug!(
            parent_id = %parent.id,
            model = self.reflection_model.model_id(),
            chars = child.len(),
            "reflection produced child instruction"
        );
        Ok(child)
    }

    /// Combine two instructions, each annotated with its mean validation score.
    pub async fn merge(
        &self,
        first: &Candidate,
        first_score: f64,
        second: &Candidate,
        second_score: f64,
    ) -> DomainResult<String> {
        let input = MERGE_TEMPLATE
            .replace("{first_score}", &format!("{first_score:.3}"))
            .replace("{second_score}", &format!("{second_score:.3}"))
            .replace("{first}", &first.instruction)
            .replace("{second}", &second.instruction);
        let reply = self
            .reflection_model
            .generate(REFLECTION_SYSTEM_PROMPT, &input)
            .await?;
        extract_instruction(&reply)
    }
}

/// Pull the instruction out of a reflection reply.
pub fn extract_instruction(reply: &str) -> DomainResult<String> {
    let text = fenced_block(reply).unwrap_or(reply).trim();
    if text.is_empty() {
        return Err(OptimizerError::InvalidMutation(
            "reflection reply contained no instruction".to_string(),
        ));
    }
    Ok(text.to_string())
}

/// Info strings recognised on the opening fence line.
const FENCE_TAGS: &[&str] = &["text", "txt", "plaintext", "plain", "markdown", "md", "prompt", "instruction"];

/// Body of the first ``` fenced block, without its info string.
fn fenced_block(reply: &str) -> Option<&str> {
    let start = reply.find("```")?;
    let after_open = &reply[start + 3..];
    let end = after_open.find("```")?;
    let block = &after_open[..end];
    // Only a known tag directly after the fence is dropped; any other
    // first line is part of the instruction.
    match block.split_once('\n') {
        Some((first_line, rest)) if is_fence_tag(first_line.trim_end()) => Some(rest),
        _ => Some(block),
    }
}

fn is_fence_tag(line: &str) -> bool {
    line.is_empty() || FENCE_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(line))
}
