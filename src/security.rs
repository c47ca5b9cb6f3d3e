use std::sync::OnceLock;

use regex::Regex;

/// Masks known secrets and password-looking fragments before text reaches the
/// log output.
pub fn redact_text(input: &str, secrets: &[String]) -> String {
    let mut output = input.to_string();

    for secret in secrets {
        if !secret.trim().is_empty() {
            output = output.replace(secret, "***");
        }
    }

    for regex in redaction_regexes() {
        output = regex.replace_all(&output, "$1***").to_string();
    }
    output
}

fn redaction_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES
        .get_or_init(|| {
            vec![
                Regex::new(r#"(?i)(password\s*[:=]\s*)[^\s"']+"#).expect("invalid password regex"),
                Regex::new(r#"(\s-p)"[^"]*""#).expect("invalid mysql password regex"),
                Regex::new(r#"(?i)(pwd=)[^&\s]+"#).expect("invalid form password regex"),
            ]
        })
        .as_slice()
}

#[cfg(test)]
mod tests {
    use super::redact_text;

    #[test]
    fn masks_explicit_secrets_and_inline_mysql_passwords() {
        let text = "mysql -u wp -p\"s3cret\" -e \"USE wp;\" password=hunter2";
        let redacted = redact_text(text, &["hunter2".to_string()]);
        assert!(!redacted.contains("s3cret"));
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains("-p***"));
    }

    #[test]
    fn blank_secrets_are_ignored() {
        assert_eq!(redact_text("which php", &["  ".to_string()]), "which php");
    }
}
