//! `ulearn models`: inspect and manage classification-model descriptors.

use std::str::FromStr;

use anyhow::{bail, Result};

use usage_learn_core::models::{BackendType, ModelDescriptor};

use crate::config::Config;
use crate::engine::Engine;

pub enum ModelsAction {
    List,
    Add {
        id: String,
        name: String,
        backend: String,
        file: Option<String>,
        url: Option<String>,
    },
    Remove {
        id: String,
    },
    Select {
        id: Option<String>,
    },
    Verify {
        id: String,
    },
    ClearReady {
        id: String,
    },
    Status,
}

pub async fn run_models(config: &Config, action: ModelsAction) -> Result<()> {
    let engine = Engine::open(config).await?;
    let result = dispatch(&engine, action).await;
    engine.shutdown().await;
    result
}

async fn dispatch(engine: &Engine, action: ModelsAction) -> Result<()> {
    let registry = engine.registry();

    match action {
        ModelsAction::List => {
            let selected = registry.get_selected().await?.map(|d| d.id);
            let models = registry.list_available().await?;
            println!(
                "  {:<24} {:<28} {:<10} {:<8} {}",
                "ID", "NAME", "BACKEND", "FILE", "KIND"
            );
            println!("  {}", "-".repeat(84));
            for m in &models {
                let marker = if selected.as_deref() == Some(m.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:<24} {:<28} {:<10} {:<8} {}",
                    marker,
                    m.id,
                    m.display_name,
                    m.backend_type.as_str(),
                    if m.downloaded { "yes" } else { "no" },
                    if m.built_in { "built-in" } else { "custom" }
                );
            }
        }
        ModelsAction::Add {
            id,
            name,
            backend,
            file,
            url,
        } => {
            let descriptor = ModelDescriptor {
                id: id.clone(),
                display_name: name,
                backend_type: BackendType::from_str(&backend)?,
                local_file_path: file,
                download_url: url,
                downloaded: false,
                built_in: false,
            };
            if registry.add_custom(descriptor).await? {
                println!("Added model '{}'.", id);
            } else {
                bail!("A model with id '{}' already exists", id);
            }
        }
        ModelsAction::Remove { id } => {
            if registry.remove_custom(&id).await? {
                println!("Removed model '{}'.", id);
            } else {
                bail!("No custom model with id '{}'", id);
            }
        }
        ModelsAction::Select { id: Some(id) } => {
            registry.set_selected(&id).await?;
            println!("Selected model '{}'.", id);
        }
        ModelsAction::Select { id: None } => {
            registry.clear_selected().await?;
            println!("Selection cleared.");
        }
        ModelsAction::Verify { id } => {
            if registry.verify_download(&id).await? {
                let digest = registry.file_digest(&id).await?.unwrap_or_default();
                println!("Model '{}' file present (sha256 {}).", id, digest);
            } else {
                println!(
                    "Model '{}' file missing; expected under {}.",
                    id,
                    registry.models_dir().display()
                );
            }
        }
        ModelsAction::ClearReady { id } => {
            if registry.find(&id).await?.is_none() {
                bail!("Unknown model id: '{}'", id);
            }
            registry.clear_ready(&id).await?;
            println!("Model '{}' marked not ready.", id);
        }
        ModelsAction::Status => {
            let selected = registry.get_selected().await?;
            println!("Active model:   {}", registry.get_active_model_name().await?);
            match selected {
                Some(d) => {
                    let path = registry.resolve_file_path(&d.id).await?;
                    println!("Selected model: {} ({})", d.id, d.display_name);
                    println!(
                        "Model file:     {}",
                        path.map(|p| p.display().to_string())
                            .unwrap_or_else(|| "(missing)".to_string())
                    );
                    println!("Ready:          {}", registry.is_ready().await?);
                }
                None => println!("Selected model: (none)"),
            }
            println!("Models dir:     {}", registry.models_dir().display());
        }
    }

    Ok(())
}
