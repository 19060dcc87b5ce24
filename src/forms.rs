use std::path::PathBuf;

use crate::api::{LoginRequest, ProfileField, RegisterRequest};
use crate::session::CurrentProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    FullName,
    Email,
    Password,
    PasswordConfirm,
    Phone,
    RememberMe,
    Otp,
    NewPassword,
    PicturePath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldKind {
    Text,
    Secret,
    Checkbox,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextField {
    pub id: FieldId,
    pub label: &'static str,
    pub value: String,
    kind: FieldKind,
    checked: bool,
}

impl TextField {
    fn text(id: FieldId, label: &'static str) -> Self {
        Self {
            id,
            label,
            value: String::new(),
            kind: FieldKind::Text,
            checked: false,
        }
    }

    fn secret(id: FieldId, label: &'static str) -> Self {
        Self {
            kind: FieldKind::Secret,
            ..Self::text(id, label)
        }
    }

    fn checkbox(id: FieldId, label: &'static str) -> Self {
        Self {
            kind: FieldKind::Checkbox,
            ..Self::text(id, label)
        }
    }

    pub fn is_checkbox(&self) -> bool {
        self.kind == FieldKind::Checkbox
    }

    pub fn display_value(&self) -> String {
        match self.kind {
            FieldKind::Checkbox => {
                if self.checked {
                    "[x]".to_string()
                } else {
                    "[ ]".to_string()
                }
            }
            FieldKind::Secret => "*".repeat(self.value.chars().count()),
            FieldKind::Text => self.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter your {0}.")]
    Missing(&'static str),
    #[error("Passwords do not match.")]
    PasswordMismatch,
}

/// A vertical stack of inputs with one focused field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub title: &'static str,
    fields: Vec<TextField>,
    active: usize,
}

impl Form {
    fn new(title: &'static str, fields: Vec<TextField>) -> Self {
        Self {
            title,
            fields,
            active: 0,
        }
    }

    pub fn fields(&self) -> &[TextField] {
        &self.fields
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn focus_next(&mut self) {
        if !self.fields.is_empty() {
            self.active = (self.active + 1) % self.fields.len();
        }
    }

    pub fn focus_previous(&mut self) {
        if !self.fields.is_empty() {
            self.active = (self.active + self.fields.len() - 1) % self.fields.len();
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        if let Some(field) = self.fields.get_mut(self.active) {
            if field.is_checkbox() {
                if ch == ' ' {
                    field.checked = !field.checked;
                }
            } else {
                field.value.push(ch);
            }
        }
    }

    pub fn backspace(&mut self) {
        if let Some(field) = self.fields.get_mut(self.active) {
            field.value.pop();
        }
    }

    pub fn value(&self, id: FieldId) -> &str {
        self.field(id).map(|f| f.value.as_str()).unwrap_or("")
    }

    pub fn checked(&self, id: FieldId) -> bool {
        self.field(id).map(|f| f.checked).unwrap_or(false)
    }

    pub fn set_value(&mut self, id: FieldId, value: impl Into<String>) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.id == id) {
            field.value = value.into();
        }
    }

    pub fn clear(&mut self) {
        for field in &mut self.fields {
            field.value.clear();
            field.checked = false;
        }
        self.active = 0;
    }

    fn field(&self, id: FieldId) -> Option<&TextField> {
        self.fields.iter().find(|f| f.id == id)
    }

    fn required(&self, id: FieldId) -> Result<String, ValidationError> {
        let field = self.field(id);
        let value = field.map(|f| f.value.trim()).unwrap_or("");
        if value.is_empty() {
            let label = field.map(|f| f.label).unwrap_or("value");
            return Err(ValidationError::Missing(noun(label)));
        }
        Ok(value.to_string())
    }
}

fn noun(label: &'static str) -> &'static str {
    match label {
        "Full name" => "full name",
        "Email" => "email",
        "Password" | "New password" => "password",
        "Confirm password" => "password confirmation",
        "OTP" => "OTP",
        other => other,
    }
}

pub fn login_form() -> Form {
    Form::new(
        "Login",
        vec![
            TextField::text(FieldId::Email, "Email"),
            TextField::secret(FieldId::Password, "Password"),
            TextField::checkbox(FieldId::RememberMe, "Remember me"),
        ],
    )
}

pub fn register_form() -> Form {
    Form::new(
        "Register",
        vec![
            TextField::text(FieldId::FullName, "Full name"),
            TextField::text(FieldId::Email, "Email"),
            TextField::secret(FieldId::Password, "Password"),
            TextField::secret(FieldId::PasswordConfirm, "Confirm password"),
            TextField::text(FieldId::Phone, "Phone number"),
        ],
    )
}

pub fn reset_form() -> Form {
    Form::new(
        "Reset Password",
        vec![TextField::text(FieldId::Email, "Email")],
    )
}

pub fn reset_confirm_form() -> Form {
    Form::new(
        "Confirm Reset",
        vec![
            TextField::text(FieldId::Otp, "OTP"),
            TextField::secret(FieldId::NewPassword, "New password"),
        ],
    )
}

pub fn profile_form() -> Form {
    Form::new(
        "Profile",
        vec![
            TextField::text(FieldId::FullName, "Full name"),
            TextField::text(FieldId::Email, "Email"),
            TextField::text(FieldId::Phone, "Phone number"),
            TextField::secret(FieldId::NewPassword, "New password"),
            TextField::text(FieldId::PicturePath, "Picture file"),
        ],
    )
}

/// Pre-fills the profile form from a freshly fetched profile.
pub fn fill_profile(form: &mut Form, profile: &CurrentProfile) {
    let name = if profile.is_guest() {
        ""
    } else {
        profile.full_name.as_str()
    };
    form.set_value(FieldId::FullName, name);
    form.set_value(FieldId::Email, profile.email.clone().unwrap_or_default());
    form.set_value(
        FieldId::Phone,
        profile.phone_number.clone().unwrap_or_default(),
    );
    form.set_value(FieldId::NewPassword, "");
    form.set_value(FieldId::PicturePath, "");
}

pub fn login_request(form: &Form) -> Result<LoginRequest, ValidationError> {
    Ok(LoginRequest {
        email: form.required(FieldId::Email)?,
        password: form.required(FieldId::Password)?,
        remember_me: form.checked(FieldId::RememberMe),
    })
}

pub fn register_request(form: &Form) -> Result<RegisterRequest, ValidationError> {
    let full_name = form.required(FieldId::FullName)?;
    let email = form.required(FieldId::Email)?;
    let password = form.required(FieldId::Password)?;
    let password_confirm = form.required(FieldId::PasswordConfirm)?;
    if password != password_confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(RegisterRequest {
        full_name,
        email,
        password,
        password_confirm,
        phone_number: form.value(FieldId::Phone).trim().to_string(),
    })
}

pub fn reset_email(form: &Form) -> Result<String, ValidationError> {
    form.required(FieldId::Email)
}

pub fn reset_confirmation(form: &Form) -> Result<(String, String), ValidationError> {
    Ok((
        form.required(FieldId::Otp)?,
        form.required(FieldId::NewPassword)?,
    ))
}

/// Sequence of independent profile updates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileChanges {
    pub fields: Vec<ProfileField>,
    pub picture: Option<PathBuf>,
}

/// Name, email and phone are always sent; the password and picture only
/// when filled in.
pub fn profile_changes(form: &Form) -> ProfileChanges {
    let mut fields = vec![
        ProfileField::Name(form.value(FieldId::FullName).to_string()),
        ProfileField::Email(form.value(FieldId::Email).to_string()),
        ProfileField::Phone(form.value(FieldId::Phone).to_string()),
    ];
    let password = form.value(FieldId::NewPassword);
    if !password.is_empty() {
        fields.push(ProfileField::Password(password.to_string()));
    }
    let picture = form.value(FieldId::PicturePath).trim();
    ProfileChanges {
        fields,
        picture: (!picture.is_empty()).then(|| PathBuf::from(picture)),
    }
}

/// Single-line input used for search, chat, questions and comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub value: String,
}

impl Prompt {
    pub fn insert_char(&mut self, ch: char) {
        self.value.push(ch);
    }

    pub fn backspace(&mut self) {
        self.value.pop();
    }

    /// Returns the current text and clears the prompt.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_into(form: &mut Form, text: &str) {
        for ch in text.chars() {
            form.insert_char(ch);
        }
    }

    #[test]
    fn login_requires_email_and_password() {
        let mut form = login_form();
        assert_eq!(
            login_request(&form),
            Err(ValidationError::Missing("email"))
        );
        type_into(&mut form, "ada@example.com");
        form.focus_next();
        type_into(&mut form, "pw");
        form.focus_next();
        form.insert_char(' ');
        let request = login_request(&form).unwrap();
        assert_eq!(request.email, "ada@example.com");
        assert!(request.remember_me);
    }

    #[test]
    fn secrets_are_masked() {
        let mut form = login_form();
        form.focus_next();
        type_into(&mut form, "hunter");
        assert_eq!(form.fields()[1].display_value(), "******");
        assert_eq!(form.fields()[2].display_value(), "[ ]");
    }

    #[test]
    fn focus_wraps_both_ways() {
        let mut form = reset_confirm_form();
        form.focus_previous();
        assert_eq!(form.active_index(), 1);
        form.focus_next();
        assert_eq!(form.active_index(), 0);
    }

    #[test]
    fn register_checks_password_confirmation() {
        let mut form = register_form();
        form.set_value(FieldId::FullName, "Ada");
        form.set_value(FieldId::Email, "ada@example.com");
        form.set_value(FieldId::Password, "one");
        form.set_value(FieldId::PasswordConfirm, "two");
        assert_eq!(
            register_request(&form),
            Err(ValidationError::PasswordMismatch)
        );
        form.set_value(FieldId::PasswordConfirm, "one");
        assert_eq!(register_request(&form).unwrap().phone_number, "");
    }

    #[test]
    fn profile_changes_skip_blank_password_and_picture() {
        let mut form = profile_form();
        fill_profile(
            &mut form,
            &CurrentProfile {
                full_name: "Ada".into(),
                profile_picture: "p.png".into(),
                email: Some("ada@example.com".into()),
                phone_number: None,
            },
        );
        let changes = profile_changes(&form);
        let labels: Vec<&str> = changes.fields.iter().map(|f| f.label()).collect();
        assert_eq!(labels, vec!["name", "email", "phone"]);
        assert_eq!(changes.picture, None);

        form.set_value(FieldId::NewPassword, "secret");
        form.set_value(FieldId::PicturePath, " /tmp/me.png ");
        let changes = profile_changes(&form);
        assert_eq!(changes.fields.last().map(|f| f.label()), Some("password"));
        assert_eq!(changes.picture, Some(PathBuf::from("/tmp/me.png")));
    }

    #[test]
    fn prompt_take_clears() {
        let mut prompt = Prompt::default();
        prompt.insert_char('h');
        prompt.insert_char('i');
        prompt.backspace();
        assert_eq!(prompt.take(), "h");
        assert!(prompt.value.is_empty());
    }
}
