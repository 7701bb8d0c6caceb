use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

use urban_audit::config::Config;
use urban_audit::media::FileSource;
use urban_audit::state::data::{
    Interview, Mapillary, ModuleName, Poster, Problem, Skywalk, Survey, WardMap,
};
use urban_audit::state::session::BatchOutcome;
use urban_audit::viewer::{ItemRef, Viewer, ViewerModule};
use urban_audit::{Library, Session};

/// Image extensions picked up by folder import
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "heic"];

/// Command-line arguments for urban-audit
#[derive(Parser, Debug)]
#[command(name = "urban-audit")]
#[command(about = "Local record keeper for urban-audit field data")]
#[command(version)]
struct Args {
    /// Database file (overrides URBAN_AUDIT_DB and config.toml)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// User to act as
    #[arg(short, long, global = true, env = "URBAN_AUDIT_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known users
    Users,
    /// Register a new user
    AddUser { name: String },
    /// Show storage size and per-module counts
    Info,
    /// Export every user's data as JSON
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete all of the current user's data
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// List one module's items
    List { module: ModuleName },
    /// Delete an item by id
    Delete {
        module: ModuleName,
        id: i64,
        #[arg(long)]
        yes: bool,
    },
    /// Delete one image of a skywalk or Mapillary item, e.g. `1700000000000-2`
    DeleteImage {
        module: ModuleName,
        reference: ItemRef,
        #[arg(long)]
        yes: bool,
    },
    /// Upload poster images
    Poster {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        desc: String,
        /// Import every image under this folder as well
        #[arg(long)]
        dir: Option<PathBuf>,
        files: Vec<PathBuf>,
    },
    /// Add a ward map by URL and/or file
    WardMap {
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value = "")]
        desc: String,
    },
    /// Record a skywalk audit with its photos
    Skywalk {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        desc: String,
        files: Vec<PathBuf>,
    },
    /// Import a survey CSV
    Survey {
        #[arg(long)]
        title: String,
        file: Option<PathBuf>,
    },
    /// Upload an audio or video interview
    Interview {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        desc: String,
        file: Option<PathBuf>,
    },
    /// Add a Mapillary link with optional frames
    Mapillary {
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
        files: Vec<PathBuf>,
    },
    /// Save a solved-problem reference
    Problem {
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "")]
        desc: String,
        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
    },
    /// Print a survey's chart series as JSON
    Chart { id: i64 },
    /// Print a ward map's KML features and bounds as JSON
    Features { id: i64 },
    /// Step through a module's images (n/p/d/q on stdin)
    View {
        module: ModuleName,
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load config.toml")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .log_level
                    .clone()
                    .unwrap_or_else(|| "urban_audit=info".to_string())
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let db_path = config.resolve_db_path(args.db.as_deref());
    let library = Library::open(&db_path, &config.default_users())
        .context("Failed to open the audit database")?;
    let mut session = Session::open(library).context("Failed to load the audit store")?;

    match &args.command {
        Command::Users => {
            for user in &session.store().users {
                println!("{}", user);
            }
            return Ok(());
        }
        Command::AddUser { name } => {
            session.add_user(name)?;
            println!("✅ Added user {}", name.trim());
            return Ok(());
        }
        _ => {}
    }

    let Some(user) = args.user.as_deref() else {
        bail!("--user is required for this command");
    };
    session.login(user)?;

    run(&mut session, &config, args.command).await
}

async fn run(session: &mut Session, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Users | Command::AddUser { .. } => {}
        Command::Info => {
            let info = session.storage_info()?;
            println!("Storage key:  {}", info.key);
            println!("Current user: {} ({} items)", info.user, info.total_items);
            println!(
                "Total size:   {:.2} KB ({:.2} MB) {}",
                info.size_kb,
                info.size_mb,
                if info.healthy { "Healthy" } else { "Large" }
            );
            for (module, count) in info.modules {
                println!("  {:<12} {} items", module.key(), count);
            }
        }
        Command::Export { out } => {
            let dir = config.resolve_export_dir(out.as_deref());
            let path = session.export(&dir)?;
            println!("📥 Exported to {}", path.display());
        }
        Command::Clear { yes } => {
            let user = session.current_user().unwrap_or_default().to_string();
            if confirm(
                yes,
                &format!("Clear all data for {}? This cannot be undone!", user),
            )? {
                session.clear_user_data()?;
                println!("Your data has been cleared.");
            }
        }
        Command::List { module } => list(session, module)?,
        Command::Delete { module, id, yes } => {
            if confirm(yes, &format!("Delete {} item {}?", module, id))? {
                if session.delete_item(module, id)? {
                    println!("🗑️  Deleted {}", id);
                } else {
                    println!("No {} item with id {}", module, id);
                }
            }
        }
        Command::DeleteImage {
            module,
            reference,
            yes,
        } => {
            let ItemRef::Sub {
                parent_id,
                sub_index,
            } = reference
            else {
                bail!("expected <parentId>-<subIndex>, got {}", reference);
            };
            if confirm(yes, &format!("Delete image {}?", reference))? {
                session.delete_sub_image(module, parent_id, sub_index)?;
                println!("🗑️  Deleted image {}", reference);
            }
        }
        Command::Poster {
            title,
            desc,
            dir,
            mut files,
        } => {
            if let Some(dir) = dir {
                files.extend(scan_images(&dir));
            }
            let outcome = session.submit_poster(sources(files), &title, &desc).await?;
            report(&outcome, |poster: &Poster| poster.id);
        }
        Command::WardMap {
            title,
            url,
            file,
            desc,
        } => {
            let map = session
                .submit_ward_map(&title, url.as_deref(), file.map(FileSource::from), &desc)
                .await?;
            println!("✅ Added ward map {}", map.id);
        }
        Command::Skywalk { title, desc, files } => {
            let outcome = session.submit_skywalk(sources(files), &title, &desc).await?;
            report(&outcome, |audit: &Skywalk| audit.id);
        }
        Command::Survey { title, file } => {
            let survey = session
                .submit_survey(file.map(FileSource::from), &title)
                .await?;
            println!(
                "✅ Added survey {} ({} responses)",
                survey.id,
                survey.data.rows.len()
            );
        }
        Command::Interview { title, desc, file } => {
            let interview = session
                .submit_interview(file.map(FileSource::from), &title, &desc)
                .await?;
            println!("✅ Added interview {}", interview.id);
        }
        Command::Mapillary { title, url, files } => {
            let outcome = session.submit_mapillary(&title, &url, sources(files)).await?;
            report(&outcome, |mapping: &Mapillary| mapping.id);
        }
        Command::Problem {
            title,
            url,
            desc,
            tags,
        } => {
            let problem = session.submit_problem(&title, &url, &desc, &tags)?;
            println!("✅ Added problem {} [{}]", problem.id, problem.tags.join(", "));
        }
        Command::Chart { id } => {
            let series = session.survey_chart(id)?;
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
        Command::Features { id } => {
            let set = session.ward_map_features(id)?;
            if set.is_empty() {
                println!("No features found in this map");
            } else {
                println!("{}", serde_json::to_string_pretty(&set)?);
            }
        }
        Command::View { module, start } => view(session, ViewerModule::try_from(module)?, start)?,
    }
    Ok(())
}

fn list(session: &Session, module: ModuleName) -> Result<()> {
    let lines: Vec<String> = match module {
        ModuleName::Posters => session
            .list::<Poster>()?
            .iter()
            .map(|p| format!("{}  {}  {}", p.id, p.date, p.title))
            .collect(),
        ModuleName::WardMaps => session
            .list::<WardMap>()?
            .iter()
            .map(|m| {
                let target = m.url.as_deref().or(m.file_name.as_deref()).unwrap_or("");
                format!("{}  {}  {}  {}", m.id, m.date, m.title, target)
            })
            .collect(),
        ModuleName::Skywalks => session
            .list::<Skywalk>()?
            .iter()
            .map(|s| format!("{}  {}  {}  ({} images)", s.id, s.date, s.title, s.images.len()))
            .collect(),
        ModuleName::Surveys => session
            .list::<Survey>()?
            .iter()
            .map(|s| {
                format!(
                    "{}  {}  {}  ({} responses; columns: {})",
                    s.id,
                    s.date,
                    s.title,
                    s.data.rows.len(),
                    s.data.headers.join(", ")
                )
            })
            .collect(),
        ModuleName::Interviews => session
            .list::<Interview>()?
            .iter()
            .map(|i| format!("{}  {}  {}  {:?}", i.id, i.date, i.title, i.kind))
            .collect(),
        ModuleName::Mapillary => session
            .list::<Mapillary>()?
            .iter()
            .map(|m| format!("{}  {}  {}  {}  ({} images)", m.id, m.date, m.title, m.url, m.images.len()))
            .collect(),
        ModuleName::Problems => session
            .list::<Problem>()?
            .iter()
            .map(|p| format!("{}  {}  {}  {}  [{}]", p.id, p.date, p.title, p.url, p.tags.join(", ")))
            .collect(),
    };

    if lines.is_empty() {
        println!("No {} yet", module);
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// Interactive slideshow over stdin
fn view(session: &mut Session, module: ViewerModule, start: usize) -> Result<()> {
    let mut viewer = Viewer::default();
    viewer.open(session, module, start)?;

    let mut line = String::new();
    loop {
        let (Some(item), Some(index)) = (viewer.current(), viewer.index()) else {
            break;
        };
        println!("[{}] {} ({})", index + 1, item.title, item.reference);
        print!("n/p/d/q> ");
        io::stdout().flush()?;

        line.clear();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        apply_key(&mut viewer, session, line.trim(), |prompt| confirm(false, prompt))?;
    }
    Ok(())
}

/// Apply one slideshow key; `d` deletes only once `ask` agrees
fn apply_key(
    viewer: &mut Viewer,
    session: &mut Session,
    key: &str,
    mut ask: impl FnMut(&str) -> Result<bool>,
) -> Result<()> {
    match key {
        "n" => viewer.next(),
        "p" => viewer.prev(),
        "d" => {
            if ask("Delete this image?")? {
                viewer.delete_current(session)?;
            }
        }
        "q" => viewer.close(),
        other => println!("Unknown command: {}", other),
    }
    Ok(())
}

/// Collect image files under `folder`, recursively
fn scan_images(folder: &Path) -> Vec<PathBuf> {
    info!("🔍 Scanning folder: {}", folder.display());

    WalkDir::new(folder)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        })
        .collect()
}

fn sources(files: Vec<PathBuf>) -> Vec<FileSource> {
    files.into_iter().map(FileSource::from).collect()
}

fn report<T>(outcome: &BatchOutcome<T>, id: impl Fn(&T) -> i64) {
    for item in &outcome.items {
        println!("✅ Added {}", id(item));
    }
    for skipped in &outcome.skipped {
        println!("⚠️  Skipped {}: {}", skipped.name, skipped.reason);
    }
}

/// Ask before a destructive action unless `--yes` was given
fn confirm(yes: bool, prompt: &str) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
