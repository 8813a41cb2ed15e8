use serde::{Deserialize, Serialize};

use crate::validator::{max_chars, not_blank, permitted_value, Validator};

pub const TITLE_MAX_CHARS: usize = 100;
pub const PERMITTED_EXPIRES: [i64; 3] = [1, 7, 365];

#[derive(Debug, Deserialize, Serialize)]
pub struct SnippetCreateForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Lifetime in days, kept as sent so a non-number fails validation
    /// instead of the decode.
    #[serde(default)]
    pub expires: String,
    #[serde(default, skip_deserializing)]
    pub validator: Validator,
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: "365".into(),
            validator: Validator::default(),
        }
    }
}

impl SnippetCreateForm {
    /// Parsed lifetime in days, or 0 when `expires` is not an integer.
    pub fn expires_in_days(&self) -> i64 {
        self.expires.trim().parse().unwrap_or(0)
    }

    pub fn validate(&mut self) -> bool {
        let days = self.expires_in_days();
        let v = &mut self.validator;
        v.check_field(not_blank(&self.title), "title", "This field cannot be blank");
        v.check_field(
            max_chars(&self.title, TITLE_MAX_CHARS),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", "This field cannot be blank");
        v.check_field(
            permitted_value(days, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v.valid()
    }
}
