use serde::de::DeserializeOwned;
use subforge_core::CoreError;
use tracing::{debug, warn};

/// Returns the outermost `{...}` span of a completion, tolerating code fences and prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = strip_code_fence(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&body[start..=end])
}

fn strip_code_fence(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parses a completion as `T`, reporting failures as a generation failure for `stage`.
pub fn parse_json_response<T: DeserializeOwned>(text: &str, stage: &str) -> Result<T, CoreError> {
    let Some(candidate) = extract_json_object(text) else {
        warn!("No JSON object in {} response ({} chars)", stage, text.len());
        return Err(CoreError::generation_failed(
            stage,
            "response did not contain a JSON object",
        ));
    };

    serde_json::from_str(candidate).map_err(|e| {
        debug!("Unparseable {} response: {}", stage, candidate);
        CoreError::generation_failed(stage, format!("invalid JSON: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Scored {
        score: f64,
    }

    #[test]
    fn test_plain_object() {
        assert_eq!(extract_json_object(r#"{"a":1}"#), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_code_fence_and_prose() {
        let fenced = "```json\n{\"score\": 7}\n```";
        assert_eq!(extract_json_object(fenced), Some("{\"score\": 7}"));

        let prose = "Sure! Here you go: {\"score\": {\"nested\": true}} Hope this helps.";
        assert_eq!(
            extract_json_object(prose),
            Some("{\"score\": {\"nested\": true}}")
        );
    }

    #[test]
    fn test_missing_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_parse_json_response() {
        let parsed: Scored = parse_json_response("Result: {\"score\": 6.5}", "novelty").unwrap();
        assert_eq!(parsed.score, 6.5);
    }

    #[test]
    fn test_parse_failure_names_stage() {
        let result = parse_json_response::<Scored>("{\"score\": \"high\"}", "novelty");
        match result {
            Err(CoreError::GenerationFailed { stage, .. }) => assert_eq!(stage, "novelty"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
