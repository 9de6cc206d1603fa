//! Domain types for the reservation ledger.
//!
//! Persisted records (`InventoryItem`, `ShootPlan`, `Booking`) serialize to
//! camelCase JSON documents; timestamps are stored as epoch milliseconds.
//! Input-boundary types (`PlanDraft`, `BookingRequest`, `Choice`) only exist
//! on the way in and collapse to plain records once accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a shoot plan (`pl-…`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    /// Wrap an existing id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("pl-{}", Uuid::new_v4().simple()))
    }

    /// The id as stored
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of a booking (`bk-…`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    /// Wrap an existing id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("bk-{}", Uuid::new_v4().simple()))
    }

    /// The id as stored
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookingId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Correlates a command with its outcome on the action broadcast
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random `RequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// A bookable equipment type with a fixed number of units
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Stable id, e.g. `cam-1`
    pub id: String,
    /// Display category, e.g. `Kamera`
    pub category: String,
    /// Display name
    pub name: String,
    /// Units owned by the school
    pub total_stock: u32,
    /// External product link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Persistent note about damage or quirks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_notes: Option<String>,
}

// ============================================================================
// Shoot plans
// ============================================================================

/// Student group designator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupLetter {
    /// Group A
    A,
    /// Group B
    B,
    /// Group C
    C,
    /// Group D
    D,
    /// Group E
    E,
    /// Group F
    F,
    /// No group
    #[default]
    #[serde(rename = "Keine")]
    Keine,
}

impl GroupLetter {
    /// Label as shown and stored
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
            Self::Keine => "Keine",
        }
    }
}

impl fmt::Display for GroupLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One person in the shoot crew
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Full name
    pub name: String,
    /// Crew role, e.g. camera or sound
    pub role: String,
}

/// Where and when a shoot happens
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootLocation {
    /// Street address
    pub address: String,
    /// Shoot day as entered
    pub date: String,
    /// Start time as entered
    pub time_start: String,
    /// End time as entered
    pub time_end: String,
}

/// The descriptive shoot record a student submits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootPlan {
    /// Plan id
    pub id: PlanId,
    /// Self-service edit code, see [`crate::edit_code`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_code: Option<String>,
    /// Class, e.g. `Me25a` or a custom value
    pub class_name: String,
    /// Project type, e.g. `Werbespot` or a custom value
    pub project_type: String,
    /// Topic or working title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_topic: Option<String>,
    /// Group designator
    #[serde(default)]
    pub group_letter: GroupLetter,
    /// Crew, at most [`MAX_MEMBERS`]
    #[serde(default)]
    pub members: Vec<GroupMember>,
    /// Shoot locations, at most [`MAX_LOCATIONS`]
    #[serde(default)]
    pub locations: Vec<ShootLocation>,
    /// Phone number to reach the group
    #[serde(default)]
    pub contact_phone: String,
    /// Day the equipment comes back
    #[serde(default)]
    pub return_date: String,
    /// Days the equipment is stored at school between shoot days
    #[serde(default)]
    pub storage_dates: Vec<String>,
    /// When the plan was submitted
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// When the plan was last revised through its edit code
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Maximum crew size per plan
pub const MAX_MEMBERS: usize = 5;

/// Maximum shoot locations per plan
pub const MAX_LOCATIONS: usize = 8;

// ============================================================================
// Bookings
// ============================================================================

/// Booking lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Submitted, still editable by the student
    Pending,
    /// Staged for hand-out, not yet signed for
    Packed,
    /// Signed for and out of the building
    Active,
    /// Every handed-out unit is back
    Returned,
}

impl BookingStatus {
    /// Whether the booking still holds stock
    #[must_use]
    pub const fn reserves_stock(self) -> bool {
        matches!(self, Self::Pending | Self::Packed | Self::Active)
    }

    /// Whether equipment has been signed for
    #[must_use]
    pub const fn is_issued(self) -> bool {
        matches!(self, Self::Active | Self::Returned)
    }

    /// Lowercase label as stored
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Packed => "packed",
            Self::Active => "active",
            Self::Returned => "returned",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inventory line of a booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingItem {
    /// Inventory item id
    pub item_id: String,
    /// Units requested by the student
    pub requested_count: u32,
    /// Units physically handed out
    #[serde(default)]
    pub handed_out_count: u32,
    /// Units back in stock
    #[serde(default)]
    pub returned_count: u32,
    /// Labels of the specific units, e.g. `Cam 2`
    #[serde(default)]
    pub specific_ids: Vec<String>,
    /// Hand-out note
    #[serde(default)]
    pub notes: String,
}

impl BookingItem {
    /// Fresh line for `count` units, nothing handed out yet
    #[must_use]
    pub fn requested(item_id: impl Into<String>, count: u32) -> Self {
        Self {
            item_id: item_id.into(),
            requested_count: count,
            handed_out_count: 0,
            returned_count: 0,
            specific_ids: Vec::new(),
            notes: String::new(),
        }
    }

    /// Units still counted against stock
    #[must_use]
    pub const fn outstanding(&self) -> u32 {
        self.requested_count.saturating_sub(self.returned_count)
    }

    /// Whether every handed-out unit is back
    #[must_use]
    pub const fn is_returned(&self) -> bool {
        self.returned_count >= self.handed_out_count
    }

    /// `returned <= handed out <= requested`
    #[must_use]
    pub const fn counts_consistent(&self) -> bool {
        self.returned_count <= self.handed_out_count
            && self.handed_out_count <= self.requested_count
    }
}

/// Equipment that is not part of the inventory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomItem {
    /// What it is
    pub name: String,
    /// How many
    pub count: u32,
    /// Note
    #[serde(default)]
    pub notes: String,
}

/// Equipment reservation and hand-out record for one plan
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking id
    pub id: BookingId,
    /// Owning plan
    pub plan_id: PlanId,
    /// Inventory lines in request order
    #[serde(default)]
    pub items: Vec<BookingItem>,
    /// Non-inventory lines
    #[serde(default)]
    pub custom_items: Vec<CustomItem>,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Signature payload captured at hand-out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// When the signature was first captured
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub handout_date: Option<DateTime<Utc>>,
}

impl Booking {
    /// Line for an inventory item
    #[must_use]
    pub fn item(&self, item_id: &str) -> Option<&BookingItem> {
        self.items.iter().find(|line| line.item_id == item_id)
    }

    /// Mutable line for an inventory item
    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut BookingItem> {
        self.items.iter_mut().find(|line| line.item_id == item_id)
    }
}

// ============================================================================
// Input boundary
// ============================================================================

/// Class names offered in the booking form
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassName {
    /// Me25a
    Me25a,
    /// Me25b
    Me25b,
    /// Me24a
    Me24a,
    /// Me24b
    Me24b,
    /// Me23a
    Me23a,
    /// Me23b
    Me23b,
}

impl ClassName {
    /// Every offered class
    pub const ALL: [Self; 6] = [
        Self::Me25a,
        Self::Me25b,
        Self::Me24a,
        Self::Me24b,
        Self::Me23a,
        Self::Me23b,
    ];

    /// Label as stored
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Me25a => "Me25a",
            Self::Me25b => "Me25b",
            Self::Me24a => "Me24a",
            Self::Me24b => "Me24b",
            Self::Me23a => "Me23a",
            Self::Me23b => "Me23b",
        }
    }
}

/// Project types offered in the booking form
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectType {
    /// Werbespot
    Werbespot,
    /// Podcast
    Podcast,
    /// Nonfiktionaler Beitrag (klein)
    NonfictionSmall,
    /// Nonfiktionaler Beitrag (groß)
    NonfictionLarge,
    /// Trailer
    Trailer,
    /// Studioprojekt
    Studioprojekt,
}

impl ProjectType {
    /// Every offered project type
    pub const ALL: [Self; 6] = [
        Self::Werbespot,
        Self::Podcast,
        Self::NonfictionSmall,
        Self::NonfictionLarge,
        Self::Trailer,
        Self::Studioprojekt,
    ];

    /// Label as stored
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Werbespot => "Werbespot",
            Self::Podcast => "Podcast",
            Self::NonfictionSmall => "Nonfiktionaler Beitrag (klein)",
            Self::NonfictionLarge => "Nonfiktionaler Beitrag (groß)",
            Self::Trailer => "Trailer",
            Self::Studioprojekt => "Studioprojekt",
        }
    }
}

/// Error returned when a label is not one of the offered values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Not an offered value: {0}")]
pub struct UnknownLabel(String);

impl FromStr for ClassName {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

impl FromStr for ProjectType {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

impl AsRef<str> for ClassName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for ProjectType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Either one of the offered values or free text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Choice<K> {
    /// One of the offered values
    Known(K),
    /// Anything else the student typed
    Custom(String),
}

impl<K: AsRef<str>> Choice<K> {
    /// The value to persist, or `None` if nothing usable was entered
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        match self {
            Self::Known(known) => Some(known.as_ref().to_string()),
            Self::Custom(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            },
        }
    }
}

impl<K: FromStr> Choice<K> {
    /// Read a persisted value back: offered labels become `Known`
    #[must_use]
    pub fn parse(value: &str) -> Self {
        value
            .parse()
            .map_or_else(|_| Self::Custom(value.to_string()), Self::Known)
    }
}

/// Descriptive fields of a plan as entered by the student
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDraft {
    /// Class
    pub class_name: Choice<ClassName>,
    /// Project type
    pub project_type: Choice<ProjectType>,
    /// Topic or working title
    pub project_topic: Option<String>,
    /// Group designator
    pub group_letter: GroupLetter,
    /// Crew
    pub members: Vec<GroupMember>,
    /// Shoot locations
    pub locations: Vec<ShootLocation>,
    /// Phone number
    pub contact_phone: String,
    /// Return day
    pub return_date: String,
    /// Intermediate storage days, duplicates allowed on input
    pub storage_dates: Vec<String>,
}

impl PlanDraft {
    /// Draft prefilled from a stored plan, for editing
    #[must_use]
    pub fn from_plan(plan: &ShootPlan) -> Self {
        Self {
            class_name: Choice::parse(&plan.class_name),
            project_type: Choice::parse(&plan.project_type),
            project_topic: plan.project_topic.clone(),
            group_letter: plan.group_letter,
            members: plan.members.clone(),
            locations: plan.locations.clone(),
            contact_phone: plan.contact_phone.clone(),
            return_date: plan.return_date.clone(),
            storage_dates: plan.storage_dates.clone(),
        }
    }
}

/// One requested inventory line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Inventory item id
    pub item_id: String,
    /// Units requested
    pub count: u32,
}

/// What the student asks for
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    /// Inventory lines
    pub items: Vec<CartLine>,
    /// Non-inventory lines
    pub custom_items: Vec<CustomItem>,
}

impl BookingRequest {
    /// Request prefilled from a stored booking, for editing
    #[must_use]
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            items: booking
                .items
                .iter()
                .map(|line| CartLine {
                    item_id: line.item_id.clone(),
                    count: line.requested_count,
                })
                .collect(),
            custom_items: booking.custom_items.clone(),
        }
    }
}

/// A plan together with its booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanWithBooking {
    /// The plan
    pub plan: ShootPlan,
    /// Its booking
    pub booking: Booking,
}

/// What a student needs to keep after submitting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPlan {
    /// New plan id
    pub plan_id: PlanId,
    /// New booking id
    pub booking_id: BookingId,
    /// Code for later edits
    pub edit_code: String,
}
