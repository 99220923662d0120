//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use coursenotes_core::{
    AnnotationEnricher, ContentStore, CourseAccess, MemoryStore, get_course_assignments,
    get_course_detail, get_notes, is_feature_enabled, search,
};
use coursenotes_notes::{EnvToken, NotesClient};
use coursenotes_shared::{
    Actor, AppConfig, Course, CourseKey, CourseNotesError, CourseTree, init_config, load_config,
};
use coursenotes_storage::Storage;
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// coursenotes: graded assignments and learner notes for imported courses.
#[derive(Parser)]
#[command(
    name = "coursenotes",
    version,
    about = "List course assignments and learner notes from a local course database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Course database path (defaults to `storage.db_path` from config).
    #[arg(long, global = true, env = "COURSENOTES_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import (or replace) a course tree from a JSON file.
    Import {
        /// Course tree JSON file.
        file: PathBuf,
    },

    /// Inspect imported courses.
    Courses {
        #[command(subcommand)]
        action: CoursesAction,
    },

    /// Print a course's graded assignments and their problems as JSON.
    Assignments {
        /// Course id, e.g. `course-v1:edX+DemoX+2014`.
        course_id: String,
    },

    /// Fetch a learner's notes from the notes service.
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Course subcommands.
#[derive(Subcommand)]
pub(crate) enum CoursesAction {
    /// List every imported course.
    List,
    /// Show one course and its import history.
    Show {
        /// Course id.
        course_id: String,
    },
}

/// Notes subcommands.
#[derive(Subcommand)]
pub(crate) enum NotesAction {
    /// All of the learner's notes in a course.
    List {
        /// Course id.
        course_id: String,

        #[command(flatten)]
        actor: ActorArgs,
    },
    /// The learner's notes matching a text query.
    Search {
        /// Course id.
        course_id: String,

        /// Text to search for.
        #[arg(long)]
        text: String,

        #[command(flatten)]
        actor: ActorArgs,
    },
}

/// Who is asking.
#[derive(Args, Debug)]
pub(crate) struct ActorArgs {
    /// Numeric user id.
    #[arg(long)]
    pub user: u64,

    /// Username.
    #[arg(long, default_value = "learner")]
    pub username: String,

    /// Treat the user as course staff.
    #[arg(long)]
    pub staff: bool,

    /// Content group membership as `partition:group` (repeatable).
    #[arg(long = "group", value_parser = parse_group)]
    pub groups: Vec<(u32, u32)>,
}

impl ActorArgs {
    fn to_actor(&self) -> Actor {
        let base = if self.staff {
            Actor::staff(self.user, self.username.clone())
        } else {
            Actor::learner(self.user, self.username.clone())
        };
        self.groups
            .iter()
            .fold(base, |actor, &(partition, group)| actor.with_group(partition, group))
    }
}

/// Parse `partition:group`.
fn parse_group(s: &str) -> std::result::Result<(u32, u32), String> {
    let (partition, group) = s
        .split_once(':')
        .ok_or_else(|| format!("expected partition:group, got {s:?}"))?;
    let partition = partition
        .trim()
        .parse()
        .map_err(|e| format!("bad partition id {partition:?}: {e}"))?;
    let group = group
        .trim()
        .parse()
        .map_err(|e| format!("bad group id {group:?}: {e}"))?;
    Ok((partition, group))
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries
/// command output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "coursenotes=info",
        1 => "coursenotes=debug",
        _ => "coursenotes=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command routing
// ---------------------------------------------------------------------------

/// Dispatch CLI commands.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Import { file } => cmd_import(db, &file).await,
        Command::Courses { action } => match action {
            CoursesAction::List => cmd_courses_list(db).await,
            CoursesAction::Show { course_id } => cmd_courses_show(db, &course_id).await,
        },
        Command::Assignments { course_id } => cmd_assignments(db, &course_id).await,
        Command::Notes { action } => match action {
            NotesAction::List { course_id, actor } => {
                cmd_notes(db, &course_id, &actor, None).await
            }
            NotesAction::Search {
                course_id,
                text,
                actor,
            } => cmd_notes(db, &course_id, &actor, Some(&text)).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn db_path(db: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(config.storage.resolved_db_path()?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Load one course snapshot. A course that was never imported gives an empty
/// store so lookups report it as not found.
async fn load_snapshot(path: &Path, course_key: &CourseKey) -> Result<MemoryStore> {
    let storage = Storage::open_readonly(path).await?;
    Ok(storage.load_course(course_key).await?.unwrap_or_default())
}

fn course_of(store: &MemoryStore, course_key: &CourseKey) -> Result<Course> {
    store
        .get_course(course_key)
        .cloned()
        .ok_or_else(|| CourseNotesError::NotFound(course_key.to_string()).into())
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_import(db: Option<PathBuf>, file: &Path) -> Result<()> {
    let config = load_config()?;
    let path = db_path(db, &config)?;

    let json = std::fs::read_to_string(file)
        .map_err(|e| CourseNotesError::io(file, e))?;
    let tree: CourseTree = serde_json::from_str(&json)
        .wrap_err_with(|| format!("{} is not a course tree", file.display()))?;

    let storage = Storage::open(&path).await?;
    let summary = storage.import_course(&tree).await?;

    println!();
    println!("  Course imported!");
    println!("  Course: {}", summary.course_id);
    println!("  Nodes:  {}", summary.nodes);
    println!("  Job:    {}", summary.job_id);
    println!("  DB:     {}", path.display());
    println!();
    Ok(())
}

async fn cmd_courses_list(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&db_path(db, &config)?).await?;
    print_json(&storage.list_courses().await?)
}

async fn cmd_courses_show(db: Option<PathBuf>, course_id: &str) -> Result<()> {
    let config = load_config()?;
    let course_key: CourseKey = course_id.parse()?;
    let storage = Storage::open_readonly(&db_path(db, &config)?).await?;
    let store = storage
        .load_course(&course_key)
        .await?
        .unwrap_or_default();

    let detail = get_course_detail(&store, &course_key)?;
    print_json(&detail)?;

    for import in storage.list_imports(&course_key).await? {
        info!(
            job_id = %import.id,
            finished_at = import.finished_at.as_deref().unwrap_or("-"),
            nodes = import.node_count.unwrap_or(0),
            "import"
        );
    }
    Ok(())
}

async fn cmd_assignments(db: Option<PathBuf>, course_id: &str) -> Result<()> {
    let config = load_config()?;
    let course_key: CourseKey = course_id.parse()?;
    let store = load_snapshot(&db_path(db, &config)?, &course_key).await?;

    let assignments = get_course_assignments(&store, &course_key)?;
    print_json(&assignments)
}

async fn cmd_notes(
    db: Option<PathBuf>,
    course_id: &str,
    actor_args: &ActorArgs,
    text: Option<&str>,
) -> Result<()> {
    let config = load_config()?;
    let course_key: CourseKey = course_id.parse()?;
    let store = load_snapshot(&db_path(db, &config)?, &course_key).await?;
    let course = course_of(&store, &course_key)?;

    if !is_feature_enabled(&course, &config.features) {
        return Err(eyre!("notes are not enabled for {course_key}"));
    }

    let secret_env = &config.notes.anonymous_id_secret_env;
    let secret = std::env::var(secret_env)
        .map_err(|_| eyre!("set ${secret_env} to anonymize user ids"))?;
    let client = NotesClient::new(&config.notes, secret, EnvToken::from_config(&config.notes))?;

    let actor = actor_args.to_actor();
    let enricher =
        AnnotationEnricher::new(&store, &CourseAccess).with_base_url(config.lms.base_url.clone());

    match text {
        Some(text) => {
            let envelope = search(&client, &enricher, &actor, &course, text).await?;
            print_json(&envelope)
        }
        None => match get_notes(&client, &enricher, &actor, &course).await? {
            Some(notes) => print_json(&notes),
            None => {
                info!(course = %course_key, "no notes");
                print_json(&Vec::<()>::new())
            }
        },
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
