//! Tool-Result Normalizer
//!
//! Maps one [`ExecutionOutcome`] to the events shown to the caller and the
//! single text block fed back to the model. Empty fields produce neither an
//! event nor a summary section.

use super::events::StreamedEvent;
use crate::sandbox::ExecutionOutcome;

/// Tool result text when the code produced nothing at all
pub const SUCCESS_SENTINEL: &str = "Code executed successfully with no output.";

/// Events and model-facing summary for one execution
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    /// `output`, then `error`, then one `image` per image
    pub events: Vec<StreamedEvent>,
    pub summary: String,
    pub is_error: bool,
}

pub fn normalize(outcome: ExecutionOutcome) -> NormalizedResult {
    let ExecutionOutcome { text, images, error } = outcome;
    let error = error.filter(|e| !e.is_empty());

    let mut events = Vec::with_capacity(2 + images.len());
    let mut sections = Vec::with_capacity(3);

    if !text.is_empty() {
        sections.push(format!("Output:\n{}", text));
        events.push(StreamedEvent::Output(text));
    }

    let is_error = error.is_some();
    if let Some(error) = error {
        sections.push(format!("Error:\n{}", error));
        events.push(StreamedEvent::Error(error));
    }

    if !images.is_empty() {
        sections.push(match images.len() {
            1 => "[1 image generated]".to_string(),
            n => format!("[{} images generated]", n),
        });
        events.extend(images.into_iter().map(StreamedEvent::Image));
    }

    let summary = if sections.is_empty() {
        SUCCESS_SENTINEL.to_string()
    } else {
        sections.join("\n\n")
    };

    NormalizedResult {
        events,
        summary,
        is_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn outcome(text: &str, images: &[&str], error: Option<&str>) -> ExecutionOutcome {
        ExecutionOutcome {
            text: text.to_string(),
            images: images.iter().map(|s| s.to_string()).collect(),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_empty_outcome_yields_sentinel() {
        let result = normalize(outcome("", &[], None));
        assert!(result.events.is_empty());
        assert_eq!(result.summary, SUCCESS_SENTINEL);
        assert!(!result.is_error);
    }

    #[test]
    fn test_output_only() {
        let result = normalize(outcome("4", &[], None));
        assert_eq!(result.events, vec![StreamedEvent::Output("4".into())]);
        assert_eq!(result.summary, "Output:\n4");
    }

    #[test]
    fn test_error_only_matches_timeout_shape() {
        let result = normalize(ExecutionOutcome::failure("Execution failed"));
        assert_eq!(result.events, vec![StreamedEvent::Error("Execution failed".into())]);
        assert_eq!(result.summary, "Error:\nExecution failed");
        assert!(result.is_error);
    }

    #[test]
    fn test_all_fields_in_fixed_order() {
        let result = normalize(outcome("partial", &["img1", "img2"], Some("ValueError: bad")));
        assert_eq!(
            result.events,
            vec![
                StreamedEvent::Output("partial".into()),
                StreamedEvent::Error("ValueError: bad".into()),
                StreamedEvent::Image("img1".into()),
                StreamedEvent::Image("img2".into()),
            ]
        );
        assert_eq!(
            result.summary,
            "Output:\npartial\n\nError:\nValueError: bad\n\n[2 images generated]"
        );
    }

    #[test]
    fn test_event_count_equals_non_empty_fields() {
        let cases = [
            (outcome("", &[], None), 0),
            (outcome("x", &[], None), 1),
            (outcome("", &["i"], None), 1),
            (outcome("", &[], Some("e")), 1),
            (outcome("x", &["i"], Some("e")), 3),
            (outcome("", &[], Some("")), 0),
        ];
        for (input, expected) in cases {
            let result = normalize(input);
            assert_eq!(result.events.len(), expected);
            assert!(!result.summary.is_empty());
        }
    }

    #[test]
    fn test_single_image_notice() {
        let result = normalize(outcome("", &["img"], None));
        assert_eq!(result.summary, "[1 image generated]");
    }
}
