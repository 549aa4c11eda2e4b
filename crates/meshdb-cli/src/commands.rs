//! Command handlers for the meshdb CLI
//!
//! Every command loads the network, applies one operation and saves the
//! result only if the operation succeeded. Handlers return the text to print.

use std::fmt::Write as _;
use std::path::PathBuf;

use meshdb_core::errors::ConflictError;
use meshdb_core::{
    AddressRange, ExportConfiguration, Key, KeyIndex, MeshError, MeshNetwork, Provisioner, RangeObject,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::{Commands, KeyKind};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::store::{write_network, NetworkStore};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against the network in `store`
    pub fn execute(command: Commands, store: &NetworkStore, config: &AppConfig) -> Result<String> {
        match command {
            Commands::Create {
                name,
                provisioner,
                force,
            } => Self::handle_create(store, config, name, provisioner, force),
            Commands::Show => Self::handle_show(store),
            Commands::Validate => Self::handle_validate(store),
            Commands::AddNetKey { index, name, key } => Self::handle_add_net_key(store, index, name, key),
            Commands::AddAppKey {
                index,
                name,
                bound,
                key,
            } => Self::handle_add_app_key(store, index, name, bound, key),
            Commands::RemoveKey { kind, index, force } => Self::handle_remove_key(store, kind, index, force),
            Commands::AddProvisioner { name, unicast } => Self::handle_add_provisioner(store, config, name, unicast),
            Commands::RemoveNode { uuid } => Self::handle_remove_node(store, &uuid),
            Commands::Export {
                net_keys,
                app_keys,
                no_device_keys,
                output,
            } => Self::handle_export(store, config, net_keys, app_keys, no_device_keys, output),
        }
    }

    /// Handle the create command
    fn handle_create(
        store: &NetworkStore,
        config: &AppConfig,
        name: String,
        provisioner: String,
        force: bool,
    ) -> Result<String> {
        if store.exists() && !force {
            return Err(CliError::NetworkFile(format!(
                "{} already exists, use --force to overwrite it",
                store.path().display()
            )));
        }
        let network = MeshNetwork::create(name, provisioner, &config.network)?;
        store.save(&network)?;
        info!("Created network in {}", store.path().display());
        Ok(format!("Created network '{}' ({})", network.name(), network.uuid()))
    }

    /// Handle the show command
    fn handle_show(store: &NetworkStore) -> Result<String> {
        let network = store.load()?;
        Ok(summary(&network))
    }

    /// Handle the validate command
    fn handle_validate(store: &NetworkStore) -> Result<String> {
        let network = store.load()?;
        if network.local_provisioner_node().is_none() {
            warn!("The local provisioner has no unicast address");
        }
        Ok(format!(
            "{} is a valid network with {} nodes",
            store.path().display(),
            network.nodes().len()
        ))
    }

    fn handle_add_net_key(
        store: &NetworkStore,
        index: Option<KeyIndex>,
        name: Option<String>,
        key: Option<String>,
    ) -> Result<String> {
        let mut network = store.load()?;
        let key = key.as_deref().map(parse_key).transpose()?;
        let index = index.or_else(|| network.next_available_network_key_index());
        let name = name.unwrap_or_else(|| default_key_name("Network Key", index));

        let added = network.add_network_key(key, index, name)?.index();
        store.save(&network)?;
        Ok(format!("Added network key {}", added))
    }

    fn handle_add_app_key(
        store: &NetworkStore,
        index: Option<KeyIndex>,
        name: Option<String>,
        bound: Option<KeyIndex>,
        key: Option<String>,
    ) -> Result<String> {
        let mut network = store.load()?;
        let key = key.as_deref().map(parse_key).transpose()?;
        if let Some(bound) = bound {
            if network.network_key(bound).is_none() {
                return Err(MeshError::from(ConflictError::InvalidKey { index: bound }).into());
            }
        }
        let index = index.or_else(|| network.next_available_application_key_index());
        let name = name.unwrap_or_else(|| default_key_name("Application Key", index));

        let added = network.add_application_key(key, index, name)?.index();
        if let Some(bound) = bound {
            network.bind_application_key(added, bound)?;
        }
        store.save(&network)?;
        let bound_to = network
            .application_key(added)
            .map(|k| k.bound_network_key())
            .unwrap_or_default();
        Ok(format!("Added application key {} bound to network key {}", added, bound_to))
    }

    fn handle_remove_key(store: &NetworkStore, kind: KeyKind, index: KeyIndex, force: bool) -> Result<String> {
        let mut network = store.load()?;
        let message = match kind {
            KeyKind::Net => {
                let removed = network.remove_network_key(index, force)?;
                format!("Removed network key {} '{}'", removed.index(), removed.name)
            }
            KeyKind::App => {
                let removed = network.remove_application_key(index, force)?;
                format!("Removed application key {} '{}'", removed.index(), removed.name)
            }
        };
        store.save(&network)?;
        Ok(message)
    }

    /// Handle the add-provisioner command
    ///
    /// Without explicit ranges the provisioner gets the next free ranges of
    /// the sizes configured for new provisioners.
    fn handle_add_provisioner(
        store: &NetworkStore,
        config: &AppConfig,
        name: String,
        unicast: Vec<AddressRange>,
    ) -> Result<String> {
        let mut network = store.load()?;
        let defaults = &config.network.provisioner;
        let unicast = if unicast.is_empty() {
            let range = network
                .next_available_unicast_address_range(range_size(defaults.unicast_range.count()))
                .ok_or_else(|| MeshError::from(ConflictError::NoAddressAvailable))?;
            vec![range]
        } else {
            unicast
        };
        let groups: Vec<AddressRange> = network
            .next_available_group_address_range(range_size(defaults.group_range.count()))
            .into_iter()
            .collect();
        let scenes: Vec<_> = network
            .next_available_scene_range(range_size(defaults.scene_range.count()))
            .into_iter()
            .collect();

        let provisioner = Provisioner::with_ranges(name, &unicast, &groups, &scenes);
        let uuid = provisioner.uuid();
        network.add_provisioner(provisioner)?;
        store.save(&network)?;

        let address = network
            .node_for_provisioner(uuid)
            .map(|n| n.primary_unicast_address().to_string())
            .unwrap_or_default();
        Ok(format!("Added provisioner {} with unicast address 0x{}", uuid, address))
    }

    fn handle_remove_node(store: &NetworkStore, uuid: &str) -> Result<String> {
        let uuid = Uuid::parse_str(uuid).map_err(|e| CliError::InvalidArgument(format!("{}: {}", uuid, e)))?;
        let mut network = store.load()?;
        if network.is_local_provisioner(uuid) {
            return Err(CliError::InvalidArgument(
                "the local provisioner's node cannot be removed".to_string(),
            ));
        }
        let node = network.remove_node(uuid)?;
        store.save(&network)?;
        Ok(format!("Removed node {} at {}", node, node.unicast_range()))
    }

    /// Handle the export command
    fn handle_export(
        store: &NetworkStore,
        config: &AppConfig,
        net_keys: Vec<KeyIndex>,
        app_keys: Vec<KeyIndex>,
        no_device_keys: bool,
        output: Option<PathBuf>,
    ) -> Result<String> {
        let network = store.load()?;
        let mut export_config = if net_keys.is_empty() {
            ExportConfiguration::full()
        } else {
            ExportConfiguration::with_network_keys(net_keys)
        };
        if !app_keys.is_empty() {
            export_config = export_config.select_application_keys(app_keys);
        }
        if no_device_keys {
            export_config = export_config.without_device_keys();
        }
        let export = network.export_partial(&export_config);

        match output {
            Some(path) => {
                write_network(&path, &export, config.cli.pretty)?;
                Ok(format!("Exported network to {}", path.display()))
            }
            None if config.cli.pretty => Ok(export.to_json_pretty()?),
            None => Ok(export.to_json()?),
        }
    }
}

/// Decode 32 hex characters of key material
fn parse_key(hex_key: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| CliError::InvalidArgument(format!("invalid key '{}': {}", hex_key, e)))?;
    <[u8; 16]>::try_from(bytes.as_slice())
        .map_err(|_| CliError::InvalidArgument(format!("key must be 16 bytes, got {}", bytes.len())))
}

fn default_key_name(kind: &str, index: Option<KeyIndex>) -> String {
    match index {
        Some(index) => format!("{} {}", kind, index),
        None => kind.to_string(),
    }
}

fn range_size(count: u32) -> u16 {
    u16::try_from(count).unwrap_or(u16::MAX)
}

/// Human-readable overview of a network
pub fn summary(network: &MeshNetwork) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Network: {} ({})", network.name(), network.uuid());
    let _ = writeln!(out, "Last modified: {}", network.timestamp().to_rfc3339());
    if network.is_partial() {
        let _ = writeln!(out, "Partial export");
    }

    let _ = writeln!(out, "Network keys:");
    for key in network.network_keys() {
        let _ = writeln!(out, "  {}: {} (phase {})", key.index(), key.name, key.phase());
    }
    let _ = writeln!(out, "Application keys:");
    for key in network.application_keys() {
        let _ = writeln!(
            out,
            "  {}: {} (bound to {})",
            key.index(),
            key.name,
            key.bound_network_key()
        );
    }

    let _ = writeln!(out, "Provisioners:");
    for provisioner in network.provisioners() {
        let ranges: Vec<String> = provisioner
            .allocated_unicast_range()
            .iter()
            .map(|r| r.to_string())
            .collect();
        let _ = writeln!(out, "  {} unicast {}", provisioner, ranges.join(", "));
    }

    let _ = writeln!(out, "Nodes:");
    for node in network.nodes() {
        let _ = writeln!(
            out,
            "  {} {} ({} elements)",
            node.unicast_range(),
            node,
            node.element_count()
        );
    }

    if !network.groups().is_empty() {
        let _ = writeln!(out, "Groups:");
        for group in network.groups() {
            let _ = writeln!(out, "  {}", group);
        }
    }
    if !network.scenes().is_empty() {
        let _ = writeln!(out, "Scenes:");
        for scene in network.scenes() {
            let _ = writeln!(out, "  {} {} ({} elements)", scene.number(), scene.name, scene.addresses().len());
        }
    }
    out
}
