use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api;
use crate::community::Community;
use crate::config;
use crate::data::Services;
use crate::logging;
use crate::session::Session;
use crate::storage;
use crate::ui;

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub route: Option<String>,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let config_path = opts.config_file.clone().or_else(config::default_path);
    let display_path = friendly_path(config_path.as_deref());

    logging::init(&cfg.logging).context("init logging")?;
    tracing::info!(version = crate::VERSION, config = %display_path, "starting devguide-tui");

    let store = Arc::new(
        storage::Store::open(storage::Options {
            path: cfg.storage.path.clone(),
        })
        .context("open storage")?,
    );

    let client = api::Client::new(api::ClientConfig {
        base_url: Some(cfg.api.base_url.clone()),
        user_agent: cfg.api.user_agent.clone(),
        timeout: Some(cfg.api.timeout),
        http_client: None,
    })
    .context("build api client")?;
    tracing::debug!(base_url = %client.base_url(), "api client ready");
    let services = Services::from_client(Arc::new(client));

    let session = Session::load(store.clone()).context("load session")?;
    let community = Community::new(store.clone());

    let start_route = opts
        .route
        .clone()
        .unwrap_or_else(|| cfg.ui.start_route.clone());

    let options = ui::Options {
        services,
        session,
        community,
        start_route,
        tick_rate: cfg.ui.tick_rate,
        questions_page_size: cfg.community.questions_page_size,
        leaderboard_page_size: cfg.community.leaderboard_page_size,
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    let result = model.run();
    drop(model);

    match Arc::try_unwrap(store) {
        Ok(store) => store.close().context("close storage")?,
        Err(_) => tracing::debug!("storage still shared at shutdown"),
    }
    tracing::info!("devguide-tui exited");
    result
}

fn friendly_path(path: Option<&Path>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/devguide/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_path_shortens_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let path = home.join(".config").join("devguide").join("config.yaml");
        assert_eq!(
            friendly_path(Some(&path)),
            "~/.config/devguide/config.yaml"
        );
    }

    #[test]
    fn friendly_path_defaults_when_missing() {
        assert_eq!(friendly_path(None), "~/.config/devguide/config.yaml");
        assert_eq!(friendly_path(Some(Path::new("/etc/devguide.yaml"))), "/etc/devguide.yaml");
    }
}
