//! Shell command construction for the MySQL CLI tools.
//!
//! Every command is rendered from one of the constant [`CommandTemplate`]s.
//! Substituted values are shell-quoted when they need it, so a host name or
//! password can never split into extra shell words. Commands sent through
//! the tunnel are parsed by a second shell on the remote host and get quoted
//! once more.

use std::borrow::Cow;
use std::path::Path;

use crate::config::{ConnectionProfile, RemoteTarget};

/// Joins the tunnel command and the command run on the far side.
pub const TUNNEL_SEPARATOR: &str = " \\ ";

/// Stands in for the password token in logged commands.
pub const REDACTED_PASSWORD: &str = "-p***";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    pub name: &'static str,
    pub format: &'static str,
}

pub const CREATE_DATABASE: CommandTemplate = CommandTemplate {
    name: "create-database",
    format: "echo 'CREATE DATABASE IF NOT EXISTS `{database}`;' | mysql -h {host} -P {port} -u{user} {pass}",
};

pub const DUMP: CommandTemplate = CommandTemplate {
    name: "dump",
    format: "mysqldump -h {host} -P {port} -u{user} {pass} {database}",
};

pub const CLIENT_IMPORT: CommandTemplate = CommandTemplate {
    name: "client-import",
    format: "mysql -h {host} -P {port} -u{user} {pass} {database} < {dumpfile}",
};

pub const REMOTE_SHELL: CommandTemplate = CommandTemplate {
    name: "remote-shell",
    format: "ssh {host}",
};

// Pieces of CREATE_DATABASE and CLIENT_IMPORT for the tunnel, where only the
// client runs remotely and the echo or the `<` redirect stays on this host.
pub const CREATE_STATEMENT: CommandTemplate = CommandTemplate {
    name: "create-statement",
    format: "echo 'CREATE DATABASE IF NOT EXISTS `{database}`;'",
};

pub const CLIENT: CommandTemplate = CommandTemplate {
    name: "client",
    format: "mysql -h {host} -P {port} -u{user} {pass}",
};

pub const CLIENT_LOAD: CommandTemplate = CommandTemplate {
    name: "client-load",
    format: "mysql -h {host} -P {port} -u{user} {pass} {database}",
};

impl CommandTemplate {
    /// Single pass over the format string. Substituted values are never
    /// scanned for placeholders; unknown placeholders are kept literally.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.format.len() + 32);
        let mut rest = self.format;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let key = &after[..end];
            match vars.iter().find(|(k, _)| *k == key) {
                Some((_, value)) => out.push_str(value),
                None => out.push_str(&rest[start..start + end + 2]),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c)
}

/// Quotes `value` for a POSIX shell unless it is already a single safe word.
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    if !value.is_empty() && value.chars().all(is_shell_safe) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(format!("'{}'", value.replace('\'', "'\\''")))
}

/// `-p<password>` as one attached token, or nothing at all. A bare `-p`
/// would make the client prompt for a password.
pub fn password_flag(password: &str) -> String {
    if password.is_empty() {
        String::new()
    } else {
        format!("-p{}", shell_quote(password))
    }
}

/// Connection values ready for substitution.
#[derive(Debug, Clone)]
pub struct ProfileVars {
    host: String,
    port: String,
    user: String,
    pass: String,
    database: String,
    /// Set when any value had to be quoted. Remote commands are then quoted
    /// again so the remote shell sees the same words.
    quoted: bool,
}

impl ProfileVars {
    pub fn new(profile: &ConnectionProfile) -> Self {
        let host = shell_quote(&profile.host);
        let user = shell_quote(&profile.user);
        let password_quoted =
            !profile.password.is_empty() && matches!(shell_quote(&profile.password), Cow::Owned(_));
        ProfileVars {
            quoted: matches!(host, Cow::Owned(_)) || matches!(user, Cow::Owned(_)) || password_quoted,
            host: host.into_owned(),
            port: profile.port.to_string(),
            user: user.into_owned(),
            pass: password_flag(&profile.password),
            database: profile.database.clone(),
        }
    }

    /// Same values with the password token masked, for logging. Quoting
    /// decisions follow the real values so the logged shape matches.
    pub fn redacted(profile: &ConnectionProfile) -> Self {
        let mut vars = ProfileVars::new(profile);
        if !profile.password.is_empty() {
            vars.pass = REDACTED_PASSWORD.to_string();
        }
        vars
    }

    fn render(&self, template: &CommandTemplate, extra: &[(&str, &str)]) -> String {
        let mut vars = vec![
            ("host", self.host.as_str()),
            ("port", self.port.as_str()),
            ("user", self.user.as_str()),
            ("pass", self.pass.as_str()),
            ("database", self.database.as_str()),
        ];
        vars.extend_from_slice(extra);
        template.render(&vars)
    }
}

pub fn dump_command(vars: &ProfileVars) -> String {
    vars.render(&DUMP, &[])
}

pub fn create_database_command(vars: &ProfileVars) -> String {
    vars.render(&CREATE_DATABASE, &[])
}

pub fn import_command(vars: &ProfileVars, dumpfile: &Path) -> String {
    let dumpfile = dumpfile.to_string_lossy();
    let dumpfile = shell_quote(&dumpfile);
    vars.render(&CLIENT_IMPORT, &[("dumpfile", dumpfile.as_ref())])
}

pub fn tunnel_command(remote: &RemoteTarget) -> String {
    let host = shell_quote(&remote.ssh_host);
    REMOTE_SHELL.render(&[("host", host.as_ref())])
}

/// Runs `command` on the remote host: `ssh <host> \ <command>`.
///
/// `ssh` joins its arguments and hands them to the remote shell, which strips
/// one more level of quoting. When a value was quoted the whole command goes
/// over as one quoted word.
pub fn through_tunnel(vars: &ProfileVars, remote: &RemoteTarget, command: &str) -> String {
    let command = if vars.quoted {
        shell_quote(command)
    } else {
        Cow::Borrowed(command)
    };
    format!("{}{TUNNEL_SEPARATOR}{command}", tunnel_command(remote))
}

pub fn remote_dump_command(vars: &ProfileVars, remote: &RemoteTarget) -> String {
    through_tunnel(vars, remote, &dump_command(vars))
}

/// The dump file is redirected into `ssh` on this host and forwarded to the
/// remote client's stdin.
pub fn remote_import_command(vars: &ProfileVars, remote: &RemoteTarget, dumpfile: &Path) -> String {
    let dumpfile = dumpfile.to_string_lossy();
    let client = vars.render(&CLIENT_LOAD, &[]);
    format!(
        "{} < {}",
        through_tunnel(vars, remote, &client),
        shell_quote(&dumpfile)
    )
}

/// The CREATE statement is echoed locally and piped through the tunnel into
/// the remote client.
pub fn remote_create_database_command(vars: &ProfileVars, remote: &RemoteTarget) -> String {
    let statement = vars.render(&CREATE_STATEMENT, &[]);
    let client = vars.render(&CLIENT, &[]);
    format!("{statement} | {}", through_tunnel(vars, remote, &client))
}
