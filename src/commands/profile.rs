use crate::cli::ProfileCommand;
use crate::store::FileProfileStore;
use crate::{Context, paths, ui};
use anyhow::{Context as _, Result, bail};
use chrono::Local;
use phasekit::{Profile, ProfileStore};
use std::sync::Arc;

pub fn run(ctx: &Context, cmd: ProfileCommand) -> Result<()> {
    let store = FileProfileStore::new(paths::profiles_dir()?);
    match cmd {
        ProfileCommand::List => list(ctx, &store),
        ProfileCommand::Show { id, json } => show(&store, &id, json),
        ProfileCommand::Create {
            id,
            parent,
            properties,
        } => {
            create(&store, &id, parent.as_deref(), properties)?;
            ui::success(&format!("Created profile '{id}'"));
            Ok(())
        }
    }
}

fn list(ctx: &Context, store: &FileProfileStore) -> Result<()> {
    let ids = store.list()?;
    if ids.is_empty() {
        if !ctx.quiet {
            ui::info(&format!("No profiles in {}", store.root().display()));
        }
        return Ok(());
    }

    ui::header("Profiles");
    for id in ids {
        let saved = store
            .saved_at(&id)?
            .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        ui::kv(&id, &saved);
    }
    Ok(())
}

fn show(store: &FileProfileStore, id: &str, json: bool) -> Result<()> {
    let profile = store
        .get(id)?
        .with_context(|| format!("Profile '{id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    ui::header(&format!("Profile '{}'", profile.id()));
    if let Some(parent) = profile.parent_id() {
        ui::kv("Parent", parent);
    }

    ui::section("Properties");
    if profile.local_properties().is_empty() {
        ui::dim("(none)");
    }
    for (key, value) in profile.local_properties() {
        ui::kv(key, value);
    }

    ui::section(&format!("Units ({})", profile.unit_count()));
    for unit in profile.units() {
        ui::kv(&unit.key().to_string(), unit.touchpoint_type());
        if let Some(props) = profile.unit_properties(&unit.key()) {
            for (key, value) in props {
                ui::dim(&format!("{key} = {value}"));
            }
        }
    }
    Ok(())
}

/// Add a new profile, optionally inheriting from an existing one
fn create(
    store: &FileProfileStore,
    id: &str,
    parent: Option<&str>,
    properties: Vec<(String, String)>,
) -> Result<Profile> {
    if store.get(id)?.is_some() {
        bail!("Profile '{id}' already exists");
    }

    let mut profile = Profile::new(id);
    if let Some(parent_id) = parent {
        let parent = store
            .get(parent_id)?
            .with_context(|| format!("Parent profile '{parent_id}' not found"))?;
        profile = profile.with_parent(Arc::new(parent));
    }
    for (key, value) in properties {
        profile.set_property(key, value);
    }

    store.add(&profile)?;
    log::info!("Created profile '{id}'");
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_with_parent_and_properties() {
        let dir = TempDir::new().unwrap();
        let store = FileProfileStore::new(dir.path());
        create(&store, "base", None, vec![("installFolder".into(), "/opt".into())]).unwrap();
        create(&store, "dev", Some("base"), vec![("color".into(), "green".into())]).unwrap();

        let dev = store.get("dev").unwrap().unwrap();
        assert_eq!(dev.property("installFolder"), Some("/opt"));
        assert_eq!(dev.property("color"), Some("green"));
    }

    #[test]
    fn test_create_rejects_duplicates_and_missing_parent() {
        let dir = TempDir::new().unwrap();
        let store = FileProfileStore::new(dir.path());
        create(&store, "dev", None, Vec::new()).unwrap();

        assert!(create(&store, "dev", None, Vec::new()).is_err());
        assert!(create(&store, "other", Some("ghost"), Vec::new()).is_err());
        assert_eq!(store.list().unwrap(), vec!["dev"]);
    }
}
