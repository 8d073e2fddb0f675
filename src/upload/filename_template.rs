//! Outbound ACH filename templates.
//!
//! Templates are plain text with `{...}` placeholders: `{date:FMT}` (chrono
//! format of the upload wall clock), `{time}` (shorthand for `{date:%H%M}`),
//! `{env:NAME}`, `{routing}`, `{seq}` (single base-36 character of the daily
//! file index) and `{gpg}` (".gpg" when encryption is enabled). Unknown
//! placeholder names are rejected when the configuration loads.

use chrono::NaiveDateTime;

pub const DEFAULT_FILENAME_TEMPLATE: &str = "{date:%Y%m%d}-{time}-{routing}-{seq}.ach{gpg}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Date(String),
    Env(String),
    Routing,
    Seq,
    Gpg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    raw: String,
    tokens: Vec<Token>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder in template {0:?}")]
    Unterminated(String),
    #[error("unknown template function {0:?}")]
    UnknownFunction(String),
    #[error("{0:?} requires an argument")]
    MissingArgument(String),
}

/// Inputs substituted into a filename.
#[derive(Debug, Clone)]
pub struct FilenameData {
    pub routing_number: String,
    pub gpg: bool,
    /// Index of this file within the day, rendered base-36.
    pub index: u32,
    /// Wall clock in the cutoff timezone.
    pub timestamp: NaiveDateTime,
}

impl FilenameTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            let mut body = String::new();
            let mut closed = false;
            for inner in chars.by_ref() {
                if inner == '}' {
                    closed = true;
                    break;
                }
                body.push(inner);
            }
            if !closed {
                return Err(TemplateError::Unterminated(raw.to_string()));
            }
            let (name, arg) = match body.split_once(':') {
                Some((name, arg)) => (name.trim(), Some(arg.trim())),
                None => (body.trim(), None),
            };
            let token = match (name, arg) {
                ("date", Some(fmt)) if !fmt.is_empty() => Token::Date(fmt.to_string()),
                ("date", _) => return Err(TemplateError::MissingArgument("date".into())),
                ("time", None) => Token::Date("%H%M".to_string()),
                ("env", Some(var)) if !var.is_empty() => Token::Env(var.to_string()),
                ("env", _) => return Err(TemplateError::MissingArgument("env".into())),
                ("routing", None) => Token::Routing,
                ("seq", None) => Token::Seq,
                ("gpg", None) => Token::Gpg,
                (other, _) => return Err(TemplateError::UnknownFunction(other.to_string())),
            };
            tokens.push(token);
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(FilenameTemplate {
            raw: raw.to_string(),
            tokens,
        })
    }

    pub fn render(&self, data: &FilenameData) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Date(fmt) => out.push_str(&data.timestamp.format(fmt).to_string()),
                Token::Env(name) => out.push_str(&std::env::var(name).unwrap_or_default()),
                Token::Routing => out.push_str(&data.routing_number),
                Token::Seq => out.push(round_sequence_number(data.index)),
                Token::Gpg => {
                    if data.gpg {
                        out.push_str(".gpg");
                    }
                }
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        FilenameTemplate::parse(DEFAULT_FILENAME_TEMPLATE).expect("default template parses")
    }
}

/// Maps a daily file index onto a single character: `0-9` then `A-Z`.
pub fn round_sequence_number(seq: u32) -> char {
    if seq < 10 {
        char::from(b'0' + seq as u8)
    } else {
        char::from(b'A' + ((seq - 10) % 26) as u8)
    }
}

/// Recovers the sequence of an uploaded filename; 0 when none is found.
/// Date (8 digits), time (4 digits) and routing number (8-9 digits) segments
/// are skipped so only the short sequence segment matches.
pub fn ach_filename_seq(filename: &str) -> u32 {
    for part in filename.split('-') {
        let part = part
            .trim_end_matches(".gpg")
            .trim_end_matches(".ach");
        if part.len() == 1 {
            let c = part.chars().next().unwrap();
            if c.is_ascii_uppercase() {
                return 10 + (c as u32 - 'A' as u32);
            }
        }
        if !part.is_empty()
            && part.len() <= 2
            && part.chars().all(|c| c.is_ascii_digit())
        {
            if let Ok(n) = part.parse::<u32>() {
                return n;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn data(index: u32) -> FilenameData {
        FilenameData {
            routing_number: "987654320".into(),
            gpg: false,
            index,
            timestamp: NaiveDate::from_ymd_opt(2021, 4, 19)
                .unwrap()
                .and_time(NaiveTime::from_hms_opt(16, 20, 0).unwrap()),
        }
    }

    #[test]
    fn default_template_renders() {
        let tmpl = FilenameTemplate::default();
        assert_eq!(tmpl.render(&data(1)), "20210419-1620-987654320-1.ach");
    }

    #[test]
    fn gpg_suffix_is_appended_when_enabled() {
        let tmpl = FilenameTemplate::default();
        let mut d = data(2);
        d.gpg = true;
        assert_eq!(tmpl.render(&d), "20210419-1620-987654320-2.ach.gpg");
    }

    #[test]
    fn static_templates_pass_through() {
        let tmpl = FilenameTemplate::parse("static-template").unwrap();
        assert_eq!(tmpl.render(&data(0)), "static-template");
    }

    #[test]
    fn env_function_reads_the_environment() {
        std::env::set_var("ACH_TEMPLATE_TEST", "abc");
        let tmpl = FilenameTemplate::parse("{env:ACH_TEMPLATE_TEST}.ach").unwrap();
        assert_eq!(tmpl.render(&data(0)), "abc.ach");
    }

    #[test]
    fn custom_date_formats() {
        let tmpl = FilenameTemplate::parse("{date:%Y-%m-%d}.ach").unwrap();
        assert_eq!(tmpl.render(&data(0)), "2021-04-19.ach");
    }

    #[test]
    fn unknown_functions_are_rejected() {
        assert_eq!(
            FilenameTemplate::parse("{shell:rm -rf /}").unwrap_err(),
            TemplateError::UnknownFunction("shell".into())
        );
        assert!(FilenameTemplate::parse("{date:%Y").is_err());
        assert!(FilenameTemplate::parse("{date}").is_err());
    }

    #[test]
    fn round_sequence_numbers() {
        assert_eq!(round_sequence_number(0), '0');
        assert_eq!(round_sequence_number(9), '9');
        assert_eq!(round_sequence_number(10), 'A');
        assert_eq!(round_sequence_number(35), 'Z');
    }

    #[test]
    fn filename_seq_recovery() {
        assert_eq!(ach_filename_seq(""), 0);
        assert_eq!(ach_filename_seq("20210102-C.ach"), 12);
        assert_eq!(ach_filename_seq("20060102-0830-987654320-1.ach"), 1);
        assert_eq!(ach_filename_seq("20060102-987654320-1.ach"), 1);
        assert_eq!(ach_filename_seq("20060102-987654320-2.ach.gpg"), 2);
        assert_eq!(ach_filename_seq("my-20060102-987654320-3.ach"), 3);
        assert_eq!(ach_filename_seq("20060102-B-987654320.ach"), 11);
    }

    #[test]
    fn render_then_recover_is_identity() {
        let tmpl = FilenameTemplate::default();
        for n in 0..36 {
            let name = tmpl.render(&data(n));
            assert_eq!(ach_filename_seq(&name), n);
        }
    }
}
