//! Instance user data assembled from configured command lines.
//!
//! Lines may reference `{efs_fs_id}`, `{efs_mount_dir}`, `{site_hostname}`
//! and `{db_secret_command}`. Braces are escaped by doubling them, so a
//! shell `${VAR}` is written `${{VAR}}`. Values that are only known at
//! deploy time stay intrinsics, and the script is joined with `Fn::Join`.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::intrinsics::{base64, join};

pub const SHEBANG: &str = "#!/bin/bash";
pub const USERDATA_DIR: &str = "userdata";

#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// `value` is either a plain string or an intrinsic.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// substitute every `{name}` in `line`.
    pub fn interpolate(&self, line: &str) -> Result<Vec<Value>> {
        let mut parts = Parts::default();
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    parts.push_str("{");
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    parts.push_str("}");
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(Error::Validation(format!("Unclosed '{{' in user data line {:?}", line)));
                    }
                    let value = self.values.get(&name).ok_or_else(|| {
                        let known: Vec<&String> = self.values.keys().collect();
                        Error::Validation(format!("Unknown variable {{{name}}} in user data line {:?}\nMust be one of {:?}", line, known))
                    })?;
                    parts.push(value.clone());
                }
                '}' => {
                    return Err(Error::Validation(format!("Single '}}' encountered in user data line {:?}", line)));
                }
                c => {
                    let mut buf = [0u8; 4];
                    parts.push_str(c.encode_utf8(&mut buf));
                }
            }
        }
        Ok(parts.0)
    }
}

/// string parts get merged so the rendered join stays short.
#[derive(Default)]
struct Parts(Vec<Value>);

impl Parts {
    fn push_str(&mut self, s: &str) {
        if let Some(Value::String(last)) = self.0.last_mut() {
            last.push_str(s);
            return;
        }
        self.0.push(Value::String(s.to_string()));
    }

    fn push(&mut self, value: Value) {
        match value {
            Value::String(s) => self.push_str(&s),
            other => self.0.push(other),
        }
    }

    fn extend(&mut self, values: Vec<Value>) {
        for v in values {
            self.push(v);
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserData {
    variables: Variables,
    lines: Vec<Vec<Value>>,
}

impl UserData {
    pub fn for_linux(variables: Variables) -> Self {
        Self { variables, lines: vec![] }
    }

    pub fn add_commands<S: AsRef<str>>(&mut self, commands: &[S]) -> Result<()> {
        for command in commands {
            let line = self.variables.interpolate(command.as_ref())?;
            self.lines.push(line);
        }
        Ok(())
    }

    /// appends `<base_dir>/userdata/<name>` if it exists. Missing
    /// scripts are skipped so environments can share a parameters file.
    pub fn add_script_file(&mut self, base_dir: &Path, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Ok(false);
        }
        let path = base_dir.join(USERDATA_DIR).join(name);
        if !path.exists() {
            tracing::warn!(path = %path.display(), "user data script not found, skipping");
            return Ok(false);
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|source| Error::Io { path: path.clone(), source })?;
        self.add_commands(&[contents])?;
        Ok(true)
    }

    /// the script, base64 encoded by cloudformation.
    pub fn render(&self) -> Value {
        let mut parts = Parts::default();
        parts.push_str(SHEBANG);
        for line in self.lines.iter() {
            parts.push_str("\n");
            parts.extend(line.clone());
        }
        let mut parts = parts.0;
        if parts.len() == 1 && parts[0].is_string() {
            base64(parts.remove(0))
        } else {
            base64(join("", parts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Variables {
        Variables::new()
            .set("efs_fs_id", json!({ "Ref": "EfsFileSystem" }))
            .set("efs_mount_dir", "/mnt/efs")
            .set("site_hostname", "www.example.com")
            .set("db_secret_command", "")
    }

    #[test]
    fn literal_values_are_inlined() {
        let parts = vars().interpolate("mkdir -p {efs_mount_dir}").unwrap();
        assert_eq!(parts, vec![json!("mkdir -p /mnt/efs")]);
    }

    #[test]
    fn tokens_are_kept() {
        let parts = vars().interpolate("mount -t efs {efs_fs_id}:/ {efs_mount_dir}").unwrap();
        assert_eq!(parts, vec![
            json!("mount -t efs "),
            json!({ "Ref": "EfsFileSystem" }),
            json!(":/ /mnt/efs"),
        ]);
    }

    #[test]
    fn doubled_braces_are_escapes() {
        let parts = vars().interpolate("echo ${{HOME}} {site_hostname}").unwrap();
        assert_eq!(parts, vec![json!("echo ${HOME} www.example.com")]);
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = vars().interpolate("echo {nope}").unwrap_err();
        assert!(err.to_string().contains("Unknown variable {nope}"));
    }

    #[test]
    fn stray_braces_are_errors() {
        assert!(vars().interpolate("echo }").is_err());
        assert!(vars().interpolate("echo {efs_mount_dir").is_err());
    }

    #[test]
    fn renders_a_joined_script() {
        let mut userdata = UserData::for_linux(vars());
        userdata.add_commands(&["yum install -y amazon-efs-utils", "mount -t efs {efs_fs_id}:/ {efs_mount_dir}"]).unwrap();
        let rendered = userdata.render();
        assert_eq!(rendered, json!({ "Fn::Base64": { "Fn::Join": ["", [
            "#!/bin/bash\nyum install -y amazon-efs-utils\nmount -t efs ",
            { "Ref": "EfsFileSystem" },
            ":/ /mnt/efs",
        ]]}}));
    }

    #[test]
    fn plain_scripts_skip_the_join() {
        let mut userdata = UserData::for_linux(vars());
        userdata.add_commands(&["echo {site_hostname}"]).unwrap();
        assert_eq!(userdata.render(), json!({ "Fn::Base64": "#!/bin/bash\necho www.example.com" }));
    }

    #[test]
    fn script_files_are_appended_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(USERDATA_DIR)).unwrap();
        std::fs::write(dir.path().join(USERDATA_DIR).join("admin.sh"), "echo {site_hostname}").unwrap();

        let mut userdata = UserData::for_linux(vars());
        assert!(userdata.add_script_file(dir.path(), "admin.sh").unwrap());
        assert!(!userdata.add_script_file(dir.path(), "missing.sh").unwrap());
        assert!(!userdata.add_script_file(dir.path(), "").unwrap());
        assert_eq!(userdata.render(), json!({ "Fn::Base64": "#!/bin/bash\necho www.example.com" }));
    }
}
