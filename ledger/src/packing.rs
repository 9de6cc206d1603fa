//! Packing list for a booking, as printed for the hand-out.

use crate::catalog::catalog_order;
use crate::types::{Booking, BookingId, BookingStatus, CustomItem, InventoryItem, ShootPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One handed-out inventory line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingLine {
    /// Inventory item id
    pub item_id: String,
    /// Display name, or the id for items missing from the inventory
    pub name: String,
    /// Category, empty for items missing from the inventory
    pub category: String,
    /// Units handed out
    pub count: u32,
    /// Specific unit labels
    pub specific_ids: Vec<String>,
    /// Hand-out note
    pub notes: String,
}

/// What leaves the equipment room for one booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingList {
    /// Booking
    pub booking_id: BookingId,
    /// Current status
    pub status: BookingStatus,
    /// Class of the plan
    pub class_name: String,
    /// Project type of the plan
    pub project_type: String,
    /// Group of the plan
    pub group: String,
    /// Return day of the plan
    pub return_date: String,
    /// Handed-out lines in catalog order
    pub lines: Vec<PackingLine>,
    /// Non-inventory lines
    pub custom_items: Vec<CustomItem>,
    /// Whether a signature was captured
    pub signed: bool,
    /// When the signature was captured
    pub handed_out_at: Option<DateTime<Utc>>,
}

impl PackingList {
    /// Build the list; lines with nothing handed out are left off
    #[must_use]
    pub fn build(
        plan: &ShootPlan,
        booking: &Booking,
        inventory: &BTreeMap<String, InventoryItem>,
    ) -> Self {
        let mut lines: Vec<PackingLine> = booking
            .items
            .iter()
            .filter(|line| line.handed_out_count > 0)
            .map(|line| {
                let item = inventory.get(&line.item_id);
                PackingLine {
                    item_id: line.item_id.clone(),
                    name: item.map_or_else(|| line.item_id.clone(), |i| i.name.clone()),
                    category: item.map(|i| i.category.clone()).unwrap_or_default(),
                    count: line.handed_out_count,
                    specific_ids: line.specific_ids.clone(),
                    notes: line.notes.clone(),
                }
            })
            .collect();
        // unknown items go last
        lines.sort_by(|a, b| {
            let known_a = inventory.contains_key(&a.item_id);
            let known_b = inventory.contains_key(&b.item_id);
            known_b
                .cmp(&known_a)
                .then_with(|| catalog_order(&a.item_id, &b.item_id))
        });

        Self {
            booking_id: booking.id.clone(),
            status: booking.status,
            class_name: plan.class_name.clone(),
            project_type: plan.project_type.clone(),
            group: plan.group_letter.to_string(),
            return_date: plan.return_date.clone(),
            lines,
            custom_items: booking.custom_items.clone(),
            signed: booking.signature.is_some(),
            handed_out_at: booking.handout_date,
        }
    }
}

impl fmt::Display for PackingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Packing list {} ({}) - {} / {} / Group {}",
            self.booking_id, self.status, self.class_name, self.project_type, self.group
        )?;
        writeln!(f, "Return by: {}", self.return_date)?;
        for line in &self.lines {
            write!(f, "  {:>3} x {}", line.count, line.name)?;
            if !line.specific_ids.is_empty() {
                write!(f, " [{}]", line.specific_ids.join(", "))?;
            }
            if !line.notes.is_empty() {
                write!(f, " - {}", line.notes)?;
            }
            writeln!(f)?;
        }
        for item in &self.custom_items {
            write!(f, "  {:>3} x {} (own)", item.count, item.name)?;
            if !item.notes.is_empty() {
                write!(f, " - {}", item.notes)?;
            }
            writeln!(f)?;
        }
        match (self.signed, self.handed_out_at) {
            (true, Some(at)) => write!(f, "Signed at {}", at.format("%Y-%m-%d %H:%M")),
            (true, None) => write!(f, "Signed"),
            (false, _) => write!(f, "Not signed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::seed_inventory;
    use crate::types::{BookingItem, GroupLetter, PlanId};
    use kitroom_core::environment::Clock;
    use kitroom_testing::test_clock;

    #[test]
    fn lists_handed_out_lines_in_catalog_order() {
        let inventory: BTreeMap<String, InventoryItem> = seed_inventory()
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();
        let plan = ShootPlan {
            id: PlanId::new("pl-1"),
            edit_code: None,
            class_name: "Me25a".into(),
            project_type: "Werbespot".into(),
            project_topic: None,
            group_letter: GroupLetter::B,
            members: vec![],
            locations: vec![],
            contact_phone: String::new(),
            return_date: "2025-09-12".into(),
            storage_dates: vec![],
            created_at: test_clock().now(),
            updated_at: None,
        };
        let booking = Booking {
            id: BookingId::new("bk-1"),
            plan_id: plan.id.clone(),
            items: vec![
                BookingItem { handed_out_count: 2, ..BookingItem::requested("acc-2", 2) },
                BookingItem { handed_out_count: 1, ..BookingItem::requested("prototype", 1) },
                BookingItem {
                    handed_out_count: 1,
                    specific_ids: vec!["Cam 3".into()],
                    ..BookingItem::requested("cam-1", 1)
                },
                BookingItem::requested("tripod-1", 1),
            ],
            custom_items: vec![CustomItem { name: "Eigene Drohne".into(), count: 1, notes: String::new() }],
            status: BookingStatus::Active,
            signature: Some("sig".into()),
            handout_date: Some(test_clock().now()),
        };

        let list = PackingList::build(&plan, &booking, &inventory);

        let ids: Vec<&str> = list.lines.iter().map(|l| l.item_id.as_str()).collect();
        assert_eq!(ids, ["cam-1", "acc-2", "prototype"]);
        let text = list.to_string();
        assert!(text.contains("1 x Blackmagic Pocket 6k Pro, 512 GB CFAST2.0 [Cam 3]"));
        assert!(text.contains("Eigene Drohne (own)"));
        assert!(text.ends_with("Signed at 2025-09-01 08:00"));
    }
}
