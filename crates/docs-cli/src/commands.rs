use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use comfy_table::Table;
use tokio::runtime::Runtime;
use tracing::{debug, info, info_span};

use docs_autosave::{AutoSaveConfig, AutosaveError, DocumentHandle, FileStore};
use docs_cli::script::read_script;
use docs_cli::session::{Session, SessionReport, replay};
use docs_cli::summary::apply_table_style;

use crate::cli::{Cli, ReplayArgs, ShowArgs};

/// Settings file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "autosave.toml";

/// How long pending file writes may keep the runtime alive after a command.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub fn run_replay(cli: &Cli, args: &ReplayArgs) -> Result<SessionReport> {
    let handle = DocumentHandle::new(args.doc_id.clone()).context("document id")?;
    let _span = info_span!("replay_command", handle = %handle).entered();
    let config = load_config(cli.config.as_deref(), cli.interval_ms)?;
    let steps = read_script(&args.script)?;
    info!(
        steps = steps.len(),
        interval_ms = config.interval_ms,
        store = %cli.store_dir.display(),
        "replaying session"
    );

    let store = Arc::new(FileStore::new(&cli.store_dir));
    let runtime = build_runtime()?;
    let report = runtime.block_on(async {
        let initial = if args.fresh {
            String::new()
        } else {
            load_initial(&store, &handle).await?
        };
        let session = Session {
            handle,
            config,
            store: Arc::clone(&store),
            eligible: !args.ineligible,
            initial,
        };
        replay(session, &steps).await
    });
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    report
}

pub fn run_show(cli: &Cli, args: &ShowArgs) -> Result<()> {
    let handle = DocumentHandle::new(args.doc_id.clone()).context("document id")?;
    let store = FileStore::new(&cli.store_dir);
    let runtime = build_runtime()?;
    let stored = runtime
        .block_on(store.load(&handle))
        .with_context(|| format!("load {}", store.path_for(&handle).display()))?;
    let text = String::from_utf8_lossy(&stored.content);

    if args.json {
        let value = serde_json::json!({
            "handle": stored.handle,
            "revision": stored.revision,
            "digest": stored.digest(),
            "bytes": stored.content.len(),
            "content": text,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    apply_table_style(&mut table);
    table.add_row(vec!["Document".to_string(), stored.handle.to_string()]);
    table.add_row(vec!["Revision".to_string(), stored.revision.to_string()]);
    table.add_row(vec!["SHA-256".to_string(), stored.digest()]);
    table.add_row(vec!["Bytes".to_string(), stored.content.len().to_string()]);
    table.add_row(vec![
        "File".to_string(),
        store.path_for(&handle).display().to_string(),
    ]);
    println!("{table}");
    println!("{text}");
    Ok(())
}

pub fn run_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.interval_ms)?;
    print!("{}", config.to_toml_string());
    Ok(())
}

/// Resolve settings: explicit file, then `./autosave.toml`, then defaults.
/// `interval_ms` overrides whatever the file says.
pub fn load_config(path: Option<&Path>, interval_ms: Option<u64>) -> Result<AutoSaveConfig> {
    let mut config = match config_path(path) {
        Some(path) => {
            debug!(path = %path.display(), "loading autosave settings");
            AutoSaveConfig::load_from(&path)
                .with_context(|| format!("load {}", path.display()))?
        }
        None => AutoSaveConfig::default(),
    };
    if let Some(interval_ms) = interval_ms {
        config.interval_ms = interval_ms;
    }
    if let Err(reason) = config.validate() {
        bail!("invalid autosave settings: {reason}");
    }
    Ok(config)
}

fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    fallback.is_file().then_some(fallback)
}

async fn load_initial(store: &FileStore, handle: &DocumentHandle) -> Result<String> {
    match store.load(handle).await {
        Ok(stored) => {
            debug!(revision = stored.revision, "resuming from saved copy");
            String::from_utf8(stored.content).context("saved document is not valid UTF-8")
        }
        Err(AutosaveError::NotFound { .. }) => Ok(String::new()),
        Err(error) => Err(error).context("load saved copy"),
    }
}

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")
}
