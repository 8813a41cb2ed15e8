use serde::{Deserialize, Serialize};

use crate::validator::{is_valid_email, min_chars, not_blank, Validator};

pub const PASSWORD_MIN_CHARS: usize = 8;

const BLANK: &str = "This field cannot be blank";
const BAD_EMAIL: &str = "This field must be a valid email address";
const SHORT_PASSWORD: &str = "This field must be at least 8 characters long";

/// Passwords are never echoed back into a re-rendered form.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, skip_deserializing)]
    pub validator: Validator,
}

impl SignupForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.name), "name", BLANK);
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(is_valid_email(&self.email), "email", BAD_EMAIL);
        v.check_field(not_blank(&self.password), "password", BLANK);
        v.check_field(
            min_chars(&self.password, PASSWORD_MIN_CHARS),
            "password",
            SHORT_PASSWORD,
        );
        v.valid()
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, skip_deserializing)]
    pub validator: Validator,
}

impl LoginForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(is_valid_email(&self.email), "email", BAD_EMAIL);
        v.check_field(not_blank(&self.password), "password", BLANK);
        v.valid()
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PasswordUpdateForm {
    #[serde(default, skip_serializing)]
    pub current_password: String,
    #[serde(default, skip_serializing)]
    pub new_password: String,
    #[serde(default, skip_serializing)]
    pub new_password_confirmation: String,
    #[serde(default, skip_deserializing)]
    pub validator: Validator,
}

impl PasswordUpdateForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.current_password), "current_password", BLANK);
        v.check_field(not_blank(&self.new_password), "new_password", BLANK);
        v.check_field(
            min_chars(&self.new_password, PASSWORD_MIN_CHARS),
            "new_password",
            SHORT_PASSWORD,
        );
        v.check_field(
            not_blank(&self.new_password_confirmation),
            "new_password_confirmation",
            BLANK,
        );
        v.check_field(
            self.new_password == self.new_password_confirmation,
            "new_password_confirmation",
            "Passwords do not match",
        );
        v.valid()
    }
}
