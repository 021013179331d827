// Request/response contract of the remote answer service
use serde::Serialize;
use serde_json::Value;

pub const ASK_PATH: &str = "/ask";
pub const HEALTH_PATH: &str = "/healthz";

/// Response fields that may carry the answer, in priority order.
pub const ANSWER_FIELDS: [&str; 3] = ["answer", "reply", "text"];

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_id: None,
        }
    }
}

/// Picks the first populated answer field, or falls back to the raw JSON text.
pub fn extract_answer(body: &Value) -> String {
    ANSWER_FIELDS
        .iter()
        .filter_map(|field| body.get(field))
        .find(|value| is_populated(value))
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.to_string())
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_takes_priority_over_reply_and_text() {
        let body = json!({ "text": "c", "reply": "b", "answer": "a" });
        assert_eq!(extract_answer(&body), "a");
    }

    #[test]
    fn empty_fields_fall_through_to_the_next() {
        let body = json!({ "answer": "", "reply": null, "text": "from text" });
        assert_eq!(extract_answer(&body), "from text");
    }

    #[test]
    fn non_string_answers_are_stringified() {
        assert_eq!(extract_answer(&json!({ "answer": 42 })), "42");
    }

    #[test]
    fn unknown_shape_is_shown_raw() {
        let body = json!({ "conversation_id": "x" });
        assert_eq!(extract_answer(&body), r#"{"conversation_id":"x"}"#);
    }

    #[test]
    fn raw_fallback_keeps_key_order() {
        let body: Value = serde_json::from_str(r#"{"zeta":1,"alpha":[true]}"#).unwrap();
        assert_eq!(extract_answer(&body), r#"{"zeta":1,"alpha":[true]}"#);
    }

    #[test]
    fn conversation_id_is_omitted_unless_set() {
        let plain = serde_json::to_value(AskRequest::new("why?")).unwrap();
        assert_eq!(plain, json!({ "question": "why?" }));

        let mut tagged = AskRequest::new("why?");
        tagged.conversation_id = Some("c1".into());
        let tagged = serde_json::to_value(tagged).unwrap();
        assert_eq!(tagged["conversation_id"], json!("c1"));
    }
}
