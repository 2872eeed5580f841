//! Correction prompt for the single output retry.
//!
//! When the first attempt's output cannot be parsed or fails the output
//! schema, the engine calls the model once more with the original system
//! prompt extended by a notice describing what went wrong.

use crate::error::OutputFailure;
use crate::output_parser::error::truncate;
use crate::prompt::section;

/// Total gateway calls for one request: the first attempt plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

/// Heading of the correction notice appended on retry.
pub const RETRY_NOTICE: &str = "PREVIOUS ATTEMPT FAILED VALIDATION";

/// Longest excerpt of the rejected output echoed back to the model.
const EXCERPT_CHARS: usize = 500;

/// Build the system prompt for the retry attempt.
///
/// # Example
///
/// ```
/// use intelligence_pipeline::error::OutputFailure;
/// use intelligence_pipeline::output_parser::ParseError;
/// use intelligence_pipeline::retry::correction_system_prompt;
///
/// let failure = OutputFailure::Parse(ParseError::EmptyResponse);
/// let prompt = correction_system_prompt("Be concise.", "", &failure);
/// assert!(prompt.starts_with("Be concise."));
/// assert!(prompt.contains("PREVIOUS ATTEMPT FAILED VALIDATION"));
/// ```
pub fn correction_system_prompt(original: &str, previous_output: &str, failure: &OutputFailure) -> String {
    let mut notice = format!(
        "Your previous response was rejected: {}.\n\
         Correct the problem and respond again with only the JSON value.",
        failure
    );
    let previous = previous_output.trim();
    if !previous.is_empty() {
        notice.push_str("\n\nRejected response:\n");
        notice.push_str(&truncate(previous, EXCERPT_CHARS));
    }

    let notice = section(RETRY_NOTICE, &notice);
    if original.is_empty() {
        notice
    } else {
        format!("{}\n\n{}", original, notice)
    }
}
