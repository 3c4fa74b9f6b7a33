//! Command bridge: exposes the engine's operations to a settings UI.
//!
//! The settings window itself is a separate program; it talks to the engine
//! through [`EngineState`], whose methods map one-to-one onto the commands
//! the UI issues.  Nothing in the `application` layer imports this module.
//!
//! # Data Transfer Objects (DTOs)
//!
//! Internal types such as [`DeviceId`] or [`DeviceMapping`] are not shaped
//! for a JSON frontend.  DTOs (`DeviceDto`, `MappingDto`, `CaptureStatusDto`)
//! carry only plain strings, booleans and lower-case enum tags.  Button and
//! action names in a `MappingDto` are the same names the config file uses.
//!
//! # `CommandResult<T>` wrapper
//!
//! Every command returns `CommandResult<T>` rather than `Result<T, E>`, so
//! each response has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.

use std::collections::BTreeMap;
use std::sync::Arc;

use editmouse_core::{
    Device, DeviceId, DeviceMapping, IdentityStability, MappingError, SourceButton, TargetAction,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::application::capture::{CaptureController, CaptureState, EventTap, PermissionStatus};
use crate::application::device_registry::{DeviceEvent, DeviceInventory, DeviceRegistry};
use crate::application::mapping_store::MappingStore;
use crate::application::remap_engine::{EventSynthesizer, RemapEngine};
use crate::infrastructure::storage::config::EngineConfig;

// ── Shared engine state ───────────────────────────────────────────────────────

/// The wired-up engine: mapping store, device registry, remap engine and
/// capture controller, built from injected OS adapters.
pub struct EngineState {
    pub mappings: Arc<MappingStore>,
    pub registry: Arc<DeviceRegistry>,
    pub engine: Arc<RemapEngine>,
    pub capture: CaptureController,
}

impl EngineState {
    /// Wires the engine together and seeds mappings from `config`.
    ///
    /// Does not scan for devices or start capture; the caller decides when.
    pub fn new(
        inventory: Arc<dyn DeviceInventory>,
        tap: Arc<dyn EventTap>,
        synthesizer: Arc<dyn EventSynthesizer>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let mappings = Arc::new(MappingStore::new());
        if !config.devices.is_empty() {
            mappings.replace_all(config.seed_mappings());
            info!(devices = config.devices.len(), "mappings loaded from config");
        }

        let registry = Arc::new(DeviceRegistry::new(inventory));
        let engine = Arc::new(RemapEngine::new(Arc::clone(&mappings), synthesizer));
        registry.add_listener(engine.clone());
        let capture = CaptureController::new(tap, Arc::clone(&engine));

        Arc::new(Self {
            mappings,
            registry,
            engine,
            capture,
        })
    }

    fn device_dto(&self, device: &Device) -> DeviceDto {
        DeviceDto {
            id: device.id.to_string(),
            name: device.display_name.clone(),
            connected: device.is_connected(),
            stability: match device.stability {
                IdentityStability::Serial => "serial",
                IdentityStability::PortBound => "port_bound",
            }
            .to_string(),
            remapped: self.mappings.is_remapping_for(&device.id),
        }
    }

    fn capture_status(&self, state: CaptureState) -> CaptureStatusDto {
        CaptureStatusDto {
            state,
            permission: self.capture.permission_status(),
            session_id: self.capture.session_id().map(|id| id.to_string()),
        }
    }

    // ── Devices ───────────────────────────────────────────────────────────────

    /// Every device seen since startup, connected or not.
    pub fn list_devices(&self) -> CommandResult<Vec<DeviceDto>> {
        let dtos = self
            .registry
            .list_devices()
            .iter()
            .map(|d| self.device_dto(d))
            .collect();
        CommandResult::ok(dtos)
    }

    /// Subscribes to connect/disconnect events.
    pub fn subscribe_devices(&self) -> broadcast::Receiver<DeviceEvent> {
        self.registry.subscribe()
    }

    /// Re-enumerates devices now and returns the updated list.
    pub fn rescan_devices(&self) -> CommandResult<Vec<DeviceDto>> {
        if let Err(e) = self.registry.rescan() {
            return CommandResult::err(e.to_string());
        }
        self.capture.refresh_state();
        self.list_devices()
    }

    // ── Mappings ──────────────────────────────────────────────────────────────

    /// The mapping for `device_id`; every button is listed.
    pub fn get_mapping(&self, device_id: &str) -> CommandResult<MappingDto> {
        let Some(id) = parse_device_id(device_id) else {
            return CommandResult::err("device id must not be empty");
        };
        let mapping = self.mappings.get_mapping(&id);
        CommandResult::ok(MappingDto::from_mapping(&id, &mapping))
    }

    /// Replaces the mapping for `dto.device_id`.  Takes effect for the next press.
    ///
    /// The device does not have to be connected; a mapping for an absent
    /// device applies when it is plugged in.
    pub fn set_mapping(&self, dto: MappingDto) -> CommandResult<MappingDto> {
        let Some(id) = parse_device_id(&dto.device_id) else {
            return CommandResult::err("device id must not be empty");
        };
        let mapping = match dto.to_mapping() {
            Ok(mapping) => mapping,
            Err(e) => return CommandResult::err(e.to_string()),
        };
        self.mappings.set_mapping(id.clone(), mapping);
        self.capture.refresh_state();
        CommandResult::ok(MappingDto::from_mapping(&id, &mapping))
    }

    /// Restores identity behaviour for `device_id`.
    pub fn clear_mapping(&self, device_id: &str) -> CommandResult<()> {
        let Some(id) = parse_device_id(device_id) else {
            return CommandResult::err("device id must not be empty");
        };
        self.mappings.clear_mapping(&id);
        self.capture.refresh_state();
        CommandResult::ok(())
    }

    // ── Capture ───────────────────────────────────────────────────────────────

    pub fn start_capture(&self) -> CommandResult<CaptureStatusDto> {
        match self.capture.start() {
            Ok(state) => CommandResult::ok(self.capture_status(state)),
            Err(e) => CommandResult::err(e.to_string()),
        }
    }

    pub fn stop_capture(&self) -> CommandResult<CaptureStatusDto> {
        self.capture.stop();
        CommandResult::ok(self.capture_status(CaptureState::Inactive))
    }

    pub fn capture_state(&self) -> CommandResult<CaptureStatusDto> {
        CommandResult::ok(self.capture_status(self.capture.refresh_state()))
    }

    pub fn permission_status(&self) -> CommandResult<PermissionStatus> {
        CommandResult::ok(self.capture.permission_status())
    }
}

fn parse_device_id(raw: &str) -> Option<DeviceId> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| DeviceId::from(trimmed))
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One device as shown in the settings window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDto {
    pub id: String,
    pub name: String,
    pub connected: bool,
    /// `"serial"` or `"port_bound"`; the UI warns that a port-bound mapping
    /// does not follow the mouse to another USB port.
    pub stability: String,
    pub remapped: bool,
}

/// A device mapping keyed by config-file button names.
///
/// ```json
/// { "device_id": "046d:c52b:4A3F9E21",
///   "buttons": { "button4": "Back", "middle": "Disabled" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDto {
    pub device_id: String,
    /// Missing buttons keep their default behaviour.
    #[serde(default)]
    pub buttons: BTreeMap<String, String>,
}

impl MappingDto {
    fn from_mapping(id: &DeviceId, mapping: &DeviceMapping) -> Self {
        Self {
            device_id: id.to_string(),
            buttons: mapping
                .entries()
                .map(|(source, action)| (source.name().to_string(), action.name().to_string()))
                .collect(),
        }
    }

    fn to_mapping(&self) -> Result<DeviceMapping, MappingError> {
        let entries = self
            .buttons
            .iter()
            .map(|(button, action)| {
                Ok((button.parse::<SourceButton>()?, action.parse::<TargetAction>()?))
            })
            .collect::<Result<Vec<_>, MappingError>>()?;
        Ok(DeviceMapping::from_entries(entries))
    }
}

/// Capture state plus what the UI needs to explain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStatusDto {
    pub state: CaptureState,
    pub permission: PermissionStatus,
    pub session_id: Option<String>,
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_tap::mock::MockEventTap;
    use crate::infrastructure::inventory::mock::MockInventory;
    use crate::infrastructure::storage::config::DeviceEntry;
    use crate::infrastructure::synthesizer::mock::MockSynthesizer;
    use editmouse_core::DeviceDescriptor;

    const MX_ID: &str = "046d:c52b:MX-1";

    fn mx_master() -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: 0x046d,
            product_id: 0xc52b,
            serial: Some("MX-1".to_string()),
            path: "usb-1".to_string(),
            name: "MX Master 3".to_string(),
        }
    }

    /// Builds an isolated state that never touches the real config file.
    fn make_state(config: &EngineConfig) -> (Arc<EngineState>, Arc<MockInventory>) {
        let inventory = Arc::new(MockInventory::with_devices(vec![mx_master()]));
        let state = EngineState::new(
            inventory.clone(),
            Arc::new(MockEventTap::new()),
            Arc::new(MockSynthesizer::new()),
            config,
        );
        (state, inventory)
    }

    #[test]
    fn test_list_devices_is_empty_before_first_scan() {
        let (state, _) = make_state(&EngineConfig::default());
        let result = state.list_devices();
        assert!(result.success);
        assert!(result.data.unwrap().is_empty());
    }

    #[test]
    fn test_rescan_devices_lists_connected_mouse() {
        // Arrange
        let (state, _) = make_state(&EngineConfig::default());

        // Act
        let result = state.rescan_devices();

        // Assert
        let devices = result.data.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, MX_ID);
        assert_eq!(devices[0].name, "MX Master 3");
        assert!(devices[0].connected);
        assert_eq!(devices[0].stability, "serial");
        assert!(!devices[0].remapped);
    }

    #[test]
    fn test_rescan_devices_reports_enumeration_error() {
        let (state, inventory) = make_state(&EngineConfig::default());
        inventory.set_failing(true);

        let result = state.rescan_devices();

        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_config_devices_seed_mappings() {
        // Arrange
        let mut config = EngineConfig::default();
        config.devices.push(DeviceEntry {
            id: DeviceId::from(MX_ID),
            name: None,
            buttons: DeviceMapping::identity().with(SourceButton::Middle, TargetAction::Disabled),
        });

        // Act
        let (state, _) = make_state(&config);
        let mapping = state.get_mapping(MX_ID).data.unwrap();

        // Assert
        assert_eq!(mapping.buttons.get("middle").map(String::as_str), Some("Disabled"));
        assert_eq!(mapping.buttons.get("left").map(String::as_str), Some("Default"));
        assert_eq!(mapping.buttons.len(), 5);
    }

    #[test]
    fn test_set_mapping_accepts_ui_labels_and_marks_device_remapped() {
        // Arrange
        let (state, _) = make_state(&EngineConfig::default());
        state.rescan_devices();
        let dto = MappingDto {
            device_id: MX_ID.to_string(),
            buttons: BTreeMap::from([
                ("button4".to_string(), "Forward".to_string()),
                ("button5".to_string(), "Back".to_string()),
            ]),
        };

        // Act
        let result = state.set_mapping(dto);

        // Assert
        assert!(result.success);
        let stored = state.mappings.get_mapping(&DeviceId::from(MX_ID));
        assert_eq!(
            stored.get(SourceButton::Button4),
            TargetAction::Button(SourceButton::Button5)
        );
        assert!(state.list_devices().data.unwrap()[0].remapped);
    }

    #[test]
    fn test_set_mapping_rejects_double_click() {
        let (state, _) = make_state(&EngineConfig::default());
        let dto = MappingDto {
            device_id: MX_ID.to_string(),
            buttons: BTreeMap::from([("button4".to_string(), "Double Click".to_string())]),
        };

        let result = state.set_mapping(dto);

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Double Click"));
        assert!(state.mappings.get_mapping(&DeviceId::from(MX_ID)).is_identity());
    }

    #[test]
    fn test_set_mapping_rejects_empty_device_id() {
        let (state, _) = make_state(&EngineConfig::default());
        let result = state.set_mapping(MappingDto {
            device_id: "  ".to_string(),
            buttons: BTreeMap::new(),
        });
        assert!(!result.success);
    }

    #[test]
    fn test_clear_mapping_restores_identity() {
        let (state, _) = make_state(&EngineConfig::default());
        state.set_mapping(MappingDto {
            device_id: MX_ID.to_string(),
            buttons: BTreeMap::from([("right".to_string(), "Disabled".to_string())]),
        });

        let result = state.clear_mapping(MX_ID);

        assert!(result.success);
        assert!(state.mappings.get_mapping(&DeviceId::from(MX_ID)).is_identity());
    }

    #[test]
    fn test_capture_moves_between_passthrough_and_remapping() {
        // Arrange
        let (state, _) = make_state(&EngineConfig::default());
        state.rescan_devices();

        // Act
        let started = state.start_capture().data.unwrap();
        state.set_mapping(MappingDto {
            device_id: MX_ID.to_string(),
            buttons: BTreeMap::from([("middle".to_string(), "Disabled".to_string())]),
        });
        let remapping = state.capture_state().data.unwrap();
        state.clear_mapping(MX_ID);
        let back = state.capture_state().data.unwrap();
        let stopped = state.stop_capture().data.unwrap();

        // Assert
        assert_eq!(started.state, CaptureState::Passthrough);
        assert!(started.session_id.is_some());
        assert_eq!(remapping.state, CaptureState::Remapping);
        assert_eq!(remapping.session_id, started.session_id);
        assert_eq!(back.state, CaptureState::Passthrough);
        assert_eq!(stopped.state, CaptureState::Inactive);
        assert_eq!(stopped.session_id, None);
    }

    #[test]
    fn test_capture_status_serializes_lowercase_tags() {
        let dto = CaptureStatusDto {
            state: CaptureState::Remapping,
            permission: PermissionStatus::Granted,
            session_id: None,
        };
        let json = serde_json::to_string(&dto).unwrap();
        assert_eq!(
            json,
            r#"{"state":"remapping","permission":"granted","session_id":null}"#
        );
    }

    #[test]
    fn test_command_result_err_has_no_data() {
        let result: CommandResult<()> = CommandResult::err("boom");
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
