// Footprint API wire models
//
// Only the fields the client actually reasons about are modelled
// explicitly; everything else the service sends lands in `extra`. The
// service emits `""` where it means "no value", so optional strings go
// through `empty_as_none`.

use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumString};

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

// ── Pagination envelope ──────────────────────────────────────────────

/// Standard paginated response envelope.
///
/// ```json
/// { "page": 1, "totalPages": 3, "totalCount": 45, "items": [...] }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

// ── Registrations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegistrationState {
    Pending,
    Active,
    Declined,
    Disabled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ManageType {
    FullyManaged,
    SelfManaged,
    #[serde(other)]
    Unknown,
}

/// Full registration as returned by create/update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: i64,
    pub label: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    pub state: RegistrationState,
    #[serde(default)]
    pub manage_type: Option<ManageType>,
}

impl Registration {
    /// Project onto the light shape used by listings and caches.
    pub fn to_light(&self) -> RegistrationLight {
        RegistrationLight {
            id: self.id,
            label: self.label.clone(),
            state: self.state,
        }
    }
}

/// The `{id, label, state}` projection returned by registration listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RegistrationLight {
    pub id: i64,
    pub label: String,
    pub state: RegistrationState,
}

/// Signup details attached to a new registration. Blank by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company_website: String,
}

/// Body for creating a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCreate {
    pub label: String,
    pub description: String,
    pub manage_type: ManageType,
    pub signup_data: SignupData,
    pub associated_msp_user_ids: Vec<i64>,
    pub associated_msp_group_ids: Vec<i64>,
    pub is_all_msp_accessible: bool,
}

impl RegistrationCreate {
    /// A fully-managed registration every MSP user can access, associated
    /// with `associated_msp_user_ids`.
    pub fn fully_managed(
        label: &str,
        description: &str,
        signup_data: SignupData,
        associated_msp_user_ids: Vec<i64>,
    ) -> Self {
        Self {
            label: label.to_owned(),
            description: description.to_owned(),
            manage_type: ManageType::FullyManaged,
            signup_data,
            associated_msp_user_ids,
            associated_msp_group_ids: Vec::new(),
            is_all_msp_accessible: true,
        }
    }
}

/// Partial update for a registration; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manage_type: Option<ManageType>,
}

// ── Accounts & users ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

// ── Scanners & scan surface ──────────────────────────────────────────

/// An agentless scanner: the default cloud scanner or an internal one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scanner {
    pub id: i64,
    pub label: String,
    #[serde(default)]
    pub is_default_cloud_scanner: bool,
}

/// One user input on the scan surface and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSurfaceEntry {
    pub id: i64,
    /// The target string the entry was created from.
    pub input: String,
    #[serde(default)]
    pub scanner_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub ip: Option<String>,
}

/// Body for extending the scan surface with a batch of targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendMessage {
    pub scan_targets: Vec<String>,
    pub scanners: Vec<i64>,
}

/// Identifies a scan kicked off by a scan-surface update or rescan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRef {
    pub scan_uuid: String,
    pub scanner_id: i64,
}

/// Account-wide scan activity summary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    #[serde(default)]
    pub is_scanning: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single scan.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub uuid: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub scanner_id: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Scheduled tasks ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    /// Free-form schedule definition; the service is loose about its shape.
    #[serde(default)]
    pub scheduler_config: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler_config: Option<serde_json::Value>,
}

/// Actions accepted by the "update schedule" endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ScheduleAction {
    Enable,
    Disable,
    Reset,
    Start,
    Stop,
}

// ── Reports ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ReportType {
    Historic,
    Snapshot,
}

/// Vulnerability/risk report ("CVR") for an account at one point in time.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cvr {
    #[serde(default)]
    pub technical_report: Vec<TechnicalReportEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Per-host section of a report's technical report.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalReportEntry {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub ip: Option<String>,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub severity: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_strings_become_none() {
        let entry: ScanSurfaceEntry = serde_json::from_value(json!({
            "id": 7,
            "input": "example.com",
            "hostname": "",
            "ip": "93.184.216.34"
        }))
        .unwrap();

        assert_eq!(entry.hostname, None);
        assert_eq!(entry.ip.as_deref(), Some("93.184.216.34"));
    }

    #[test]
    fn unknown_state_does_not_fail() {
        let light: RegistrationLight =
            serde_json::from_value(json!({ "id": 1, "label": "a", "state": "archived" })).unwrap();
        assert_eq!(light.state, RegistrationState::Unknown);
    }

    #[test]
    fn to_light_keeps_identity() {
        let registration = Registration {
            id: 42,
            label: "acme".into(),
            description: Some("Acme Corp".into()),
            state: RegistrationState::Active,
            manage_type: Some(ManageType::FullyManaged),
        };

        assert_eq!(
            registration.to_light(),
            RegistrationLight {
                id: 42,
                label: "acme".into(),
                state: RegistrationState::Active,
            }
        );
    }

    #[test]
    fn action_and_report_type_wire_names() {
        assert_eq!(ScheduleAction::Enable.as_ref(), "enable");
        assert_eq!(ScheduleAction::Stop.to_string(), "stop");
        assert_eq!(ReportType::Snapshot.as_ref(), "snapshot");
    }

    #[test]
    fn edit_omits_unset_fields() {
        let edit = RegistrationEdit {
            description: Some("foo".into()),
            ..RegistrationEdit::default()
        };
        assert_eq!(serde_json::to_value(&edit).unwrap(), json!({ "description": "foo" }));
    }
}
