use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use services::{AppServices, Clock, Narrator};
use storage::repository::ScenarioRepository;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tutor_core::model::{ContentAtom, ScenarioDefinition, ScenarioDocument, UserId};
use tutor_core::policy::TutorPolicy;

mod play;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFile { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFile { flag } => write!(f, "{flag} <file> is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  tutor play     --scenario <file> [--db <sqlite_url>] [--user <id>] [--policy <file>] [--shuffle] [--narrate]");
    eprintln!("  tutor practice --atoms <file>    [--db <sqlite_url>] [--user <id>] [--policy <file>]");
    eprintln!("  tutor validate --scenario <file>");
    eprintln!("  tutor import   --scenario <file> [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:tutor.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TUTOR_DB_URL, TUTOR_USER_ID, TUTOR_POLICY, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Practice,
    Validate,
    Import,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "play" => Some(Self::Play),
            "practice" => Some(Self::Practice),
            "validate" => Some(Self::Validate),
            "import" => Some(Self::Import),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    user_id: Option<UserId>,
    policy: Option<PathBuf>,
    scenario: Option<PathBuf>,
    atoms: Option<PathBuf>,
    shuffle: bool,
    narrate: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("TUTOR_DB_URL")
                .ok()
                .map_or_else(|| normalize_sqlite_url("sqlite:tutor.sqlite3".into()), normalize_sqlite_url),
            user_id: std::env::var("TUTOR_USER_ID")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(UserId::new),
            policy: std::env::var("TUTOR_POLICY").ok().map(PathBuf::from),
            scenario: None,
            atoms: None,
            shuffle: false,
            narrate: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--user" => parsed.user_id = Some(UserId::new(require_value(args, "--user")?)),
                "--policy" => parsed.policy = Some(require_value(args, "--policy")?.into()),
                "--scenario" => parsed.scenario = Some(require_value(args, "--scenario")?.into()),
                "--atoms" => parsed.atoms = Some(require_value(args, "--atoms")?.into()),
                "--shuffle" => parsed.shuffle = true,
                "--narrate" => parsed.narrate = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn scenario_path(&self) -> Result<&Path, ArgsError> {
        self.scenario
            .as_deref()
            .ok_or(ArgsError::MissingFile { flag: "--scenario" })
    }

    fn atoms_path(&self) -> Result<&Path, ArgsError> {
        self.atoms
            .as_deref()
            .ok_or(ArgsError::MissingFile { flag: "--atoms" })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn load_policy(path: Option<&Path>) -> Result<TutorPolicy, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(TutorPolicy::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let policy: TutorPolicy = serde_json::from_str(&raw)?;
    policy.validate()?;
    tracing::debug!(path = %path.display(), "loaded policy");
    Ok(policy)
}

fn load_scenario(path: &Path) -> Result<ScenarioDefinition, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let document: ScenarioDocument = serde_json::from_str(&raw)?;
    Ok(ScenarioDefinition::load(document)?)
}

fn load_atoms(path: &Path) -> Result<Vec<ContentAtom>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Echoes node content to stderr, separate from the interactive transcript.
struct TerminalNarrator;

impl Narrator for TerminalNarrator {
    fn speak(&self, text: &str) {
        eprintln!("(narrator) {text}");
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,services=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let first = argv.next();
    let cmd = match first.as_deref() {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    if cmd == Command::Validate {
        let scenario = load_scenario(parsed.scenario_path()?)?;
        println!(
            "{}: {} nodes, entry {}",
            scenario.id(),
            scenario.total_nodes(),
            scenario.entry_node_id()
        );
        return Ok(());
    }

    let policy = load_policy(parsed.policy.as_deref())?;

    // Open + migrate SQLite in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let mut tutor = AppServices::new_sqlite(&parsed.db_url, Clock::system(), policy)
        .await?
        .with_shuffle_options(parsed.shuffle);
    if parsed.narrate {
        tutor = tutor.with_narrator(Arc::new(TerminalNarrator));
    }

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    match cmd {
        Command::Import => {
            let scenario = load_scenario(parsed.scenario_path()?)?;
            tutor.scenarios().upsert_scenario(&scenario).await?;
            tracing::info!(scenario_id = %scenario.id(), "scenario imported");
        }
        Command::Play => {
            let scenario = load_scenario(parsed.scenario_path()?)?;
            tutor.scenarios().upsert_scenario(&scenario).await?;
            let player = tutor.player();
            let mut active = player.start(scenario.id(), parsed.user_id.clone()).await?;
            play::run_scenario(&player, &mut active, &mut stdin.lock(), &mut stdout.lock())
                .await?;
        }
        Command::Practice => {
            let atoms = load_atoms(parsed.atoms_path()?)?;
            let lessons = tutor.lessons();
            let mut lesson = lessons.start(atoms, parsed.user_id.clone())?;
            play::run_lesson(&lessons, &mut lesson, &mut stdin.lock(), &mut stdout.lock()).await?;
        }
        Command::Validate => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "--db",
            "sqlite::memory:",
            "--user",
            "ada",
            "--scenario",
            "intro.json",
            "--shuffle",
        ])
        .unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.user_id, Some(UserId::new("ada")));
        assert_eq!(args.scenario_path().unwrap(), Path::new("intro.json"));
        assert!(args.shuffle);
        assert!(matches!(
            args.atoms_path(),
            Err(ArgsError::MissingFile { flag: "--atoms" })
        ));
    }

    #[test]
    fn missing_flag_value_is_reported() {
        assert!(matches!(
            parse(&["--scenario"]),
            Err(ArgsError::MissingValue { flag: "--scenario" })
        ));
        assert!(matches!(parse(&["--bogus"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/tutor.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/tutor.sqlite3"));
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
    }

    #[test]
    fn bundled_scenario_files_load() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios");
        let scenario = load_scenario(&root.join("first-aid.json")).unwrap();
        assert!(scenario.total_nodes() > 3);
        let atoms = load_atoms(&root.join("arithmetic-atoms.json")).unwrap();
        assert!(!atoms.is_empty());
        let policy = load_policy(Some(&root.join("policy.json"))).unwrap();
        assert!(policy.validate().is_ok());
    }
}
