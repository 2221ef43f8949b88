//! `BKP PARM` / `BKP HPAR` parameter backups.
//!
//! Backups bypass the dispatch table: they are only reachable over HTTP GET
//! and answer with a file attachment instead of a result envelope.

use crate::envelope::ResultEnvelope;

/// Which parameter bank to dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// The 0x6A user parameters.
    Parameters,
    /// The 0x6F hidden parameters.
    HiddenParameters,
}

impl BackupKind {
    /// Column / array name, also the file stem.
    pub fn code(self) -> &'static str {
        match self {
            BackupKind::Parameters => "PARM",
            BackupKind::HiddenParameters => "HPAR",
        }
    }

    /// `CMD` reported in failure envelopes.
    pub fn command(self) -> &'static str {
        match self {
            BackupKind::Parameters => "BKP PARM",
            BackupKind::HiddenParameters => "BKP HPAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    Csv,
    Json,
}

impl BackupFormat {
    /// Exact, case-sensitive match on `CSV` / `JSON`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CSV" => Some(BackupFormat::Csv),
            "JSON" => Some(BackupFormat::Json),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            BackupFormat::Csv => "text/csv",
            BackupFormat::Json => "text/json",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            BackupFormat::Csv => "csv",
            BackupFormat::Json => "json",
        }
    }
}

/// A parsed `BKP` command. The format is kept raw so a bad one can be
/// echoed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub kind: BackupKind,
    pub format: String,
}

/// Recognize `BKP PARM <fmt>` and `BKP HPAR <fmt>`.
pub fn parse_backup_command(cmd: &str) -> Option<BackupRequest> {
    let kind = if cmd.starts_with("BKP PARM ") {
        BackupKind::Parameters
    } else if cmd.starts_with("BKP HPAR ") {
        BackupKind::HiddenParameters
    } else {
        return None;
    };
    Some(BackupRequest {
        kind,
        format: cmd[9..].to_string(),
    })
}

/// Result of a backup request.
#[derive(Debug, Clone, PartialEq)]
pub enum BackupOutcome {
    File {
        filename: String,
        content_type: &'static str,
        body: String,
    },
    Envelope(ResultEnvelope),
}

impl BackupOutcome {
    /// `Content-Disposition` header value of a file answer.
    pub fn content_disposition(&self) -> Option<String> {
        match self {
            BackupOutcome::File { filename, .. } => {
                Some(format!("attachment; filename=\"{}\"", filename))
            }
            BackupOutcome::Envelope(_) => None,
        }
    }
}

/// Envelope for an unsupported file type.
pub fn incorrect_file_type(kind: BackupKind, format: &str) -> ResultEnvelope {
    ResultEnvelope::rejected(kind.command(), format!("Incorrect File Type : {}", format))
}

/// Render a parameter bank in the requested format.
pub fn render_backup<T: Copy + Into<u64>>(
    kind: BackupKind,
    format: BackupFormat,
    values: &[T],
) -> BackupOutcome {
    let code = kind.code();
    let body = match format {
        BackupFormat::Csv => {
            let mut body = format!("{};VALUE\r\n", code);
            for (i, v) in values.iter().enumerate() {
                body.push_str(&format!("{};{}\r\n", i, (*v).into()));
            }
            body
        }
        BackupFormat::Json => {
            let values: Vec<u64> = values.iter().map(|v| (*v).into()).collect();
            let mut doc = serde_json::Map::new();
            doc.insert(code.to_string(), values.into());
            serde_json::Value::Object(doc).to_string()
        }
    };

    BackupOutcome::File {
        filename: format!("{}.{}", code, format.extension()),
        content_type: format.content_type(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Rsp;

    #[test]
    fn test_parse_backup_command() {
        let req = parse_backup_command("BKP PARM CSV").unwrap();
        assert_eq!(req.kind, BackupKind::Parameters);
        assert_eq!(req.format, "CSV");

        let req = parse_backup_command("BKP HPAR xml").unwrap();
        assert_eq!(req.kind, BackupKind::HiddenParameters);
        assert_eq!(BackupFormat::parse(&req.format), None);

        assert!(parse_backup_command("BKP PARM").is_none());
        assert!(parse_backup_command("GET PARM 1").is_none());
    }

    #[test]
    fn test_format_is_case_sensitive() {
        assert_eq!(BackupFormat::parse("JSON"), Some(BackupFormat::Json));
        assert_eq!(BackupFormat::parse("json"), None);
    }

    #[test]
    fn test_csv_body() {
        let out = render_backup(BackupKind::Parameters, BackupFormat::Csv, &[7u8, 0, 255]);
        assert_eq!(
            out,
            BackupOutcome::File {
                filename: "PARM.csv".to_string(),
                content_type: "text/csv",
                body: "PARM;VALUE\r\n0;7\r\n1;0\r\n2;255\r\n".to_string(),
            }
        );
        assert_eq!(
            out.content_disposition().as_deref(),
            Some("attachment; filename=\"PARM.csv\"")
        );
    }

    #[test]
    fn test_json_body() {
        let out = render_backup(BackupKind::HiddenParameters, BackupFormat::Json, &[300u16, 1]);
        match out {
            BackupOutcome::File {
                filename,
                content_type,
                body,
            } => {
                assert_eq!(filename, "HPAR.json");
                assert_eq!(content_type, "text/json");
                assert_eq!(body, r#"{"HPAR":[300,1]}"#);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_incorrect_file_type() {
        let env = incorrect_file_type(BackupKind::HiddenParameters, "XML");
        assert_eq!(env.info().cmd(), "BKP HPAR");
        assert_eq!(env.info().rsp(), Rsp::Error);
        assert_eq!(env.info().msg(), Some("Incorrect File Type : XML"));
        assert!(!env.is_success());
    }
}
