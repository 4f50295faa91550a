use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::Value;

/// Flags shared by plain messages and media messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageOptions {
    /// Deliver without notifying receivers.
    pub silent: bool,
    /// Do not generate a link preview.
    pub no_webpage: bool,
    /// Deliver after this delay instead of immediately.
    pub schedule: Option<Duration>,
    /// Text is HTML markup; the server renders it.
    pub html: bool,
}

impl MessageOptions {
    /// Merge the flags into request parameters.
    pub fn apply(&self, params: &mut Value) {
        let Value::Object(map) = params else {
            return;
        };
        map.insert("random_id".into(), Value::from(rand::thread_rng().gen::<i64>()));
        if self.silent {
            map.insert("silent".into(), Value::Bool(true));
        }
        if self.no_webpage {
            map.insert("no_webpage".into(), Value::Bool(true));
        }
        if let Some(delay) = self.schedule {
            map.insert("schedule_date".into(), Value::from(schedule_date(delay)));
        }
        if self.html {
            map.insert("parse_mode".into(), Value::String("html".into()));
        }
    }
}

fn schedule_date(delay: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now + delay).as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_only_add_random_id() {
        let mut params = json!({"message": "hi"});
        MessageOptions::default().apply(&mut params);
        let map = params.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert!(map["random_id"].is_i64());
    }

    #[test]
    fn flags_are_applied() {
        let mut params = json!({});
        MessageOptions {
            silent: true,
            no_webpage: true,
            schedule: Some(Duration::from_secs(3600)),
            html: true,
        }
        .apply(&mut params);

        assert_eq!(params["silent"], json!(true));
        assert_eq!(params["no_webpage"], json!(true));
        assert_eq!(params["parse_mode"], json!("html"));
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let date = params["schedule_date"].as_u64().unwrap();
        assert!(date >= now + 3599 && date <= now + 3601);
    }
}
