use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::TaskError;
use crate::strategy::Operation;

pub const DEFAULT_PORT: u16 = 3306;

/// Used for both `backup_to` and `import_from` when neither the task file
/// nor the command line names a path.
pub const DEFAULT_BACKUP_PATH: &str = "db/backups/{date}_{target}.sql";

const CONFIG_FILE_NAME: &str = "mysql-dump-import.toml";

#[derive(Debug, Parser)]
#[command(
    name = "mysql-dump-import",
    version,
    about = "Dump and import MySQL databases through mysqldump, mysql and ssh"
)]
pub struct Args {
    /// Task file (TOML, or JSON when the name ends in .json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log the commands that would run without running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Dump a target's database to a backup file
    Dump {
        /// Target name from the task file
        target: String,

        /// Overrides the target's backup_to path
        #[arg(long)]
        backup_to: Option<String>,
    },
    /// Import a backup file into a target's database
    Import {
        /// Target name from the task file
        target: String,

        /// Overrides the target's import_from path
        #[arg(long)]
        import_from: Option<String>,
    },
}

impl TaskCommand {
    pub fn operation(&self) -> Operation {
        match self {
            TaskCommand::Dump { .. } => Operation::Dump,
            TaskCommand::Import { .. } => Operation::Import,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            TaskCommand::Dump { target, .. } | TaskCommand::Import { target, .. } => target,
        }
    }

    pub fn path_override(&self) -> Option<&str> {
        match self {
            TaskCommand::Dump { backup_to, .. } => backup_to.as_deref(),
            TaskCommand::Import { import_from, .. } => import_from.as_deref(),
        }
    }
}

/// Options accepted both in the shared `[options]` table and per target.
/// Every field is optional so the two layers can be merged.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TaskOptions {
    pub title: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub database: Option<String>,
    pub ssh_host: Option<String>,
    pub ssh_create_database: Option<bool>,
    pub backup_to: Option<String>,
    pub import_from: Option<String>,
}

impl TaskOptions {
    /// Field-wise merge where `self` wins over `base`.
    pub fn or(self, base: &TaskOptions) -> TaskOptions {
        let base = base.clone();
        TaskOptions {
            title: self.title.or(base.title),
            host: self.host.or(base.host),
            port: self.port.or(base.port),
            user: self.user.or(base.user),
            pass: self.pass.or(base.pass),
            database: self.database.or(base.database),
            ssh_host: self.ssh_host.or(base.ssh_host),
            ssh_create_database: self.ssh_create_database.or(base.ssh_create_database),
            backup_to: self.backup_to.or(base.backup_to),
            import_from: self.import_from.or(base.import_from),
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TaskFile {
    #[serde(default)]
    pub options: TaskOptions,

    #[serde(default)]
    pub targets: BTreeMap<String, TaskOptions>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTarget {
    pub ssh_host: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupLocation {
    pub file: PathBuf,
    pub dir: PathBuf,
}

impl BackupLocation {
    pub fn new(file: PathBuf) -> Self {
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        BackupLocation { file, dir }
    }
}

/// Everything the dump/import pipeline needs for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTask {
    pub target: String,
    pub title: String,
    pub profile: ConnectionProfile,
    pub remote: Option<RemoteTarget>,
    pub location: BackupLocation,
    pub create_remote_database: bool,
}

/// Database names end up inside a single-quoted SQL string and backticks,
/// so only a conservative character set is accepted.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-')
}

/// Today's local date as `YYYY-MM-DD`, falling back to UTC when the local
/// offset cannot be determined.
pub fn today() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let date = now.date();
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Expands `{date}` and `{target}` in a configured path.
pub fn expand_path(template: &str, date: &str, target: &str) -> PathBuf {
    PathBuf::from(template.replace("{date}", date).replace("{target}", target))
}

pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".into());
    PathBuf::from(home)
        .join(".config")
        .join("mysql-dump-import")
        .join("config.toml")
}

pub fn parse(content: &str, path: &Path) -> Result<TaskFile, TaskError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(content)
            .map_err(|e| TaskError::ConfigFile(format!("Failed to parse {}: {e}", path.display())))
    } else {
        toml::from_str(content)
            .map_err(|e| TaskError::ConfigFile(format!("Failed to parse {}: {e}", path.display())))
    }
}

pub fn load(path: &Path) -> Result<TaskFile, TaskError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TaskError::ConfigFile(format!(
            "Failed to read {}\n\
             Create it with one table per target.\n\
             Example:\n\n\
             [targets.production]\n\
             title = \"Production\"\n\
             host = \"localhost\"\n\
             port = 3306\n\
             user = \"admin\"\n\
             pass = \"\"\n\
             database = \"mydb\"\n\
             ssh_host = \"jump.example.com\"\n\n\
             Error: {e}",
            path.display()
        ))
    })?;
    parse(&content, path)
}

fn required(value: Option<String>, name: &'static str) -> Result<String, TaskError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(TaskError::MissingOption(name)),
    }
}

/// Merges defaults, shared options, target options and the CLI path override
/// into the values for a single dump or import.
pub fn resolve(
    file: &TaskFile,
    target: &str,
    operation: Operation,
    path_override: Option<&str>,
    date: &str,
) -> Result<ResolvedTask, TaskError> {
    let target_options = file
        .targets
        .get(target)
        .ok_or_else(|| TaskError::UnknownTarget(target.to_string()))?;
    let options = target_options.clone().or(&file.options);

    let host = required(options.host, "host")?;
    let user = required(options.user, "user")?;
    let database = required(options.database, "database")?;
    if !is_valid_identifier(&database) {
        return Err(TaskError::InvalidOption(format!(
            "database name '{database}' may only contain letters, digits, '_', '$' and '-'"
        )));
    }

    let remote = match options.ssh_host {
        Some(ssh_host) if ssh_host.is_empty() => {
            return Err(TaskError::InvalidOption("ssh_host must not be empty".into()));
        }
        // ssh would read a leading '-' as an option such as -oProxyCommand
        Some(ssh_host) if ssh_host.starts_with('-') => {
            return Err(TaskError::InvalidOption(format!(
                "ssh_host '{ssh_host}' must not start with '-'"
            )));
        }
        Some(ssh_host) => Some(RemoteTarget { ssh_host }),
        None => None,
    };

    let configured_path = match operation {
        Operation::Dump => options.backup_to,
        Operation::Import => options.import_from,
    };
    let path_template = path_override
        .map(str::to_string)
        .or(configured_path)
        .unwrap_or_else(|| DEFAULT_BACKUP_PATH.to_string());

    Ok(ResolvedTask {
        target: target.to_string(),
        title: options.title.unwrap_or_else(|| target.to_string()),
        profile: ConnectionProfile {
            host,
            port: options.port.unwrap_or(DEFAULT_PORT),
            user,
            password: options.pass.unwrap_or_default(),
            database,
        },
        remote,
        location: BackupLocation::new(expand_path(&path_template, date, target)),
        create_remote_database: options.ssh_create_database.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASK_FILE: &str = r#"
[options]
user = "root"
port = 3307

[targets.local]
host = "db1"
port = 3306
database = "app"

[targets.production]
title = "Production"
host = "db.internal"
pass = "secret"
database = "app_prod"
ssh_host = "jump1"
backup_to = "dumps/{target}/{date}.sql"
"#;

    fn task_file() -> TaskFile {
        parse(TASK_FILE, Path::new("tasks.toml")).unwrap()
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let task = resolve(&task_file(), "local", Operation::Dump, None, "2024-05-01").unwrap();
        assert_eq!(
            task.profile,
            ConnectionProfile {
                host: "db1".into(),
                port: 3306,
                user: "root".into(),
                password: String::new(),
                database: "app".into(),
            }
        );
        assert_eq!(task.title, "local");
        assert!(task.remote.is_none());
        assert!(!task.create_remote_database);
        assert_eq!(task.location.file, PathBuf::from("db/backups/2024-05-01_local.sql"));
        assert_eq!(task.location.dir, PathBuf::from("db/backups"));
    }

    #[test]
    fn test_shared_options_fill_gaps() {
        let task = resolve(&task_file(), "production", Operation::Dump, None, "2024-05-01").unwrap();
        assert_eq!(task.profile.port, 3307);
        assert_eq!(task.profile.user, "root");
        assert_eq!(task.profile.password, "secret");
        assert_eq!(task.title, "Production");
        assert_eq!(task.remote, Some(RemoteTarget { ssh_host: "jump1".into() }));
        assert_eq!(task.location.file, PathBuf::from("dumps/production/2024-05-01.sql"));
    }

    #[test]
    fn test_import_uses_import_from() {
        // backup_to is dump-only
        let task = resolve(&task_file(), "production", Operation::Import, None, "2024-05-01").unwrap();
        assert_eq!(task.location.file, PathBuf::from("db/backups/2024-05-01_production.sql"));

        let task = resolve(
            &task_file(),
            "production",
            Operation::Import,
            Some("/tmp/d.sql"),
            "2024-05-01",
        )
        .unwrap();
        assert_eq!(task.location.file, PathBuf::from("/tmp/d.sql"));
        assert_eq!(task.location.dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_missing_required_option() {
        let mut file = task_file();
        file.targets.get_mut("local").unwrap().database = None;
        let err = resolve(&file, "local", Operation::Dump, None, "2024-05-01").unwrap_err();
        assert!(matches!(err, TaskError::MissingOption("database")));

        file.options.user = Some(String::new());
        let err = resolve(&file, "local", Operation::Dump, None, "2024-05-01").unwrap_err();
        assert!(matches!(err, TaskError::MissingOption("user")));
    }

    #[test]
    fn test_unknown_target() {
        let err = resolve(&task_file(), "staging", Operation::Dump, None, "2024-05-01").unwrap_err();
        assert!(matches!(err, TaskError::UnknownTarget(name) if name == "staging"));
    }

    #[test]
    fn test_rejects_unsafe_database_name() {
        let mut file = task_file();
        file.targets.get_mut("local").unwrap().database = Some("app`; DROP DATABASE x".into());
        let err = resolve(&file, "local", Operation::Import, None, "2024-05-01").unwrap_err();
        assert!(matches!(err, TaskError::InvalidOption(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_empty_ssh_host() {
        let mut file = task_file();
        file.targets.get_mut("local").unwrap().ssh_host = Some(String::new());
        let err = resolve(&file, "local", Operation::Dump, None, "2024-05-01").unwrap_err();
        assert!(matches!(err, TaskError::InvalidOption(_)));

        file.targets.get_mut("local").unwrap().ssh_host = Some("-oProxyCommand=id".into());
        let err = resolve(&file, "local", Operation::Dump, None, "2024-05-01").unwrap_err();
        assert!(matches!(err, TaskError::InvalidOption(_)));
    }

    #[test]
    fn test_parse_json_task_file() {
        let json = r#"{
            "targets": {
                "local": { "host": "db1", "user": "root", "database": "app", "ssh_create_database": true }
            }
        }"#;
        let file = parse(json, Path::new("tasks.json")).unwrap();
        let local = &file.targets["local"];
        assert_eq!(local.host.as_deref(), Some("db1"));
        assert_eq!(local.ssh_create_database, Some(true));
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let err = parse("[targets.local]\npassword = \"x\"\n", Path::new("tasks.toml")).unwrap_err();
        assert!(matches!(err, TaskError::ConfigFile(_)));
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("app"));
        assert!(is_valid_identifier("my_app-2"));
        assert!(is_valid_identifier("wp$site"));

        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("app; DROP"));
        assert!(!is_valid_identifier("app`"));
        assert!(!is_valid_identifier("it's"));
    }

    #[test]
    fn test_backup_location_without_parent() {
        let location = BackupLocation::new(PathBuf::from("dump.sql"));
        assert_eq!(location.dir, PathBuf::from("."));
    }

    #[test]
    fn test_today_format() {
        let date = today();
        assert_eq!(date.len(), 10);
        assert_eq!(date.as_bytes()[4], b'-');
        assert_eq!(date.as_bytes()[7], b'-');
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::parse_from([
            "mysql-dump-import",
            "--config",
            "tasks.toml",
            "import",
            "production",
            "--import-from",
            "/tmp/d.sql",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("tasks.toml")));
        assert!(!args.dry_run);
        assert_eq!(args.command.operation(), Operation::Import);
        assert_eq!(args.command.target(), "production");
        assert_eq!(args.command.path_override(), Some("/tmp/d.sql"));
    }
}
