//! Default equipment catalog, written once into an empty inventory.

use crate::types::InventoryItem;
use std::cmp::Ordering;

/// Categories offered when the inventory is still empty
pub const DEFAULT_CATEGORIES: [&str; 5] = ["Kamera", "Objektiv", "Licht", "Audio", "Zubehör"];

/// One row of the default catalog
#[derive(Debug, Clone, Copy)]
pub struct SeedEntry {
    /// Item id
    pub id: &'static str,
    /// Category
    pub category: &'static str,
    /// Display name
    pub name: &'static str,
    /// Units owned
    pub total_stock: u32,
    /// Search query used for the product link
    pub search: &'static str,
}

const fn seed(
    id: &'static str,
    category: &'static str,
    name: &'static str,
    total_stock: u32,
    search: &'static str,
) -> SeedEntry {
    SeedEntry {
        id,
        category,
        name,
        total_stock,
        search,
    }
}

/// The default catalog in display order
pub const SEED: [SeedEntry; 59] = [
    // Cameras
    seed("cam-1", "Kamera", "Blackmagic Pocket 6k Pro, 512 GB CFAST2.0", 5, "Blackmagic Pocket 6k Pro"),
    seed("cam-2", "Kamera", "Blackmagic Ursa Mini Pro G2 4,6k, 512 GB+256 GB CFAST2.0", 1, "Blackmagic Ursa Mini Pro G2"),
    seed("cam-3", "Kamera", "Blackmagic Ursa Broadcast G2 + Fujinon La16x8BRM (B4)", 2, "Blackmagic Ursa Broadcast G2"),
    seed("cam-4", "Kamera", "Sony ZV-E1 inkl. 3 Akkus NP-FZ100, 256 GB-SD", 6, "Sony ZV-E1"),
    seed("drone-1", "Kamera-Drohne", "DJI-Mavic Mini 3 Pro, 128GB Micro-SD", 3, "DJI Mavic Mini 3 Pro"),
    seed("action-1", "Action-Cam", "GoPro Hero 6", 1, "GoPro Hero 6"),
    // Rigging and support
    seed("rig-1", "Rigging", "Cage für Blackmagic Pocket 6k Pro", 4, "SmallRig Cage Blackmagic Pocket 6k Pro"),
    seed("rig-2", "Rigging", "Easy Rig", 2, "Easy Rig"),
    seed("tripod-1", "Kamerastativ", "Sachtler", 9, "Sachtler Stativ"),
    seed("gimbal-1", "Gimbal", "DJI Ronin III", 3, "DJI Ronin 3"),
    seed("follow-1", "Follow Focus", "DJI Focus Pro All-In-One Combo", 3, "DJI Focus Pro"),
    seed("slider-1", "Kamera Slider", "unmotorisiert", 1, "Kamera Slider"),
    seed("slider-2", "Kamera Slider", "Waterbird MS Pro 120 inkl. Fluid-Stativkopf", 2, "Waterbird MS Pro 120"),
    seed("green-1", "Greenscreen", "Manfrotto, mobil, modular, 4x3m", 2, "Manfrotto Greenscreen"),
    // EF lenses
    seed("lens-ef-1", "Objektiv EF", "Canon EF 24-105mm 1:4", 4, "Canon EF 24-105mm"),
    seed("lens-ef-2", "Objektiv EF", "Canon EF 16-35mm F2,8L III USM", 4, "Canon EF 16-35mm"),
    seed("lens-ef-3", "Objektiv EF", "Sigma 50-100mm F1,8 DC HSM", 3, "Sigma 50-100mm"),
    seed("lens-ef-4", "Objektiv EF", "Sigma 24-70 F2.8 DG", 4, "Sigma 24-70mm"),
    seed("lens-ef-5", "Objektiv EF", "Canon EF 100mm 1:2.8 L IS USM Macro", 1, "Canon EF 100mm Macro"),
    seed("lens-ef-6", "Objektiv EF", "Canon EF-S 17-55mm 1:2.8 IS", 1, "Canon EF-S 17-55mm"),
    seed("lens-ef-7", "Objektiv EF", "Canon CN-E18-80mm T4.4 L IS (Motor)", 1, "Canon CN-E18-80mm"),
    seed("lens-ef-8", "Objektiv EF", "Tamron AF 18-200mm 1:3,5 Macro (APS-C)", 1, "Tamron 18-200mm"),
    seed("lens-ef-9", "Objektiv EF", "Canon EF-S 18-55mm 1:3,5 IS", 1, "Canon EF-S 18-55mm"),
    // E-mount lenses
    seed("lens-e-1", "Objektiv E", "Sony 20mm F1.8", 6, "Sony 20mm F1.8"),
    seed("lens-e-2", "Objektiv E", "Sony-Zeiss 55 F1.8", 6, "Sony Zeiss 55mm"),
    seed("lens-e-3", "Objektiv E", "Sony 24-105mm F4", 6, "Sony 24-105mm F4"),
    // Monitoring
    seed("mon-1", "Monitor", "Portkey PT5 II mit HotShoe-Mount (5\")", 5, "Portkeys PT5 II"),
    seed("mon-2", "Monitor", "Liliput A12 4K mit Stativ (12\")", 2, "Lilliput A12"),
    // Light
    seed("light-1", "Licht LED-Set", "3xBiColorLED (Fläche, klein, mit Stativen)", 1, "BiColor LED Panel"),
    seed("light-2", "Licht LED-Set", "3xBiColorLED (Fläche, groß, mit Stativen)", 5, "BiColor LED Panel Large"),
    seed("light-3", "Licht LED", "2xBiColorLED (Spot) 55W, mit Stativen", 3, "BiColor LED Spot"),
    seed("light-rgb-1", "Licht LED RGB", "Aputure Nova 300c Kit+Stativ", 9, "Aputure Nova 300c"),
    seed("light-rgb-2", "Licht LED RGB", "Aputure MC 12 Light Set", 24, "Aputure MC"),
    seed("light-rgb-3", "Licht LED RGB", "Astera Helios RGB Tubes (8 Tubes)", 8, "Astera Helios Tube"),
    seed("light-rgb-4", "Licht LED RGB", "Astera Titan RGB Tubes", 15, "Astera Titan Tube"),
    seed("light-acc-1", "Licht Zubehör", "Astera Transmitter Box", 2, "Astera Transmitter Box"),
    seed("light-acc-2", "Licht", "Faltreflektor/Bounce weiß/gold", 3, "Reflektor Gold Weiß"),
    seed("light-acc-3", "Licht", "Faltreflektor/Bounce weiß/silber", 3, "Reflektor Silber Weiß"),
    // Audio
    seed("audio-w-1", "Audio Funk", "Sennheiser G3, Bodypacks, 1 Lavalier", 5, "Sennheiser G3 ew100"),
    seed("audio-w-2", "Audio Funk", "DJI Mic (je 1 Rx, 2 Tx, 2 Lavaliers)", 4, "DJI Mic"),
    seed("audio-w-3", "Audio Funk", "Røde Wireless Pro (je 1 RX, 2 TX, 2 Lavaliers)", 3, "Rode Wireless Pro"),
    seed("audio-rec-1", "Audio Recorder", "Sounddevices MixPre6, 128 GB", 3, "Sounddevices MixPre6"),
    seed("audio-rec-2", "Audio Recorder", "Sounddevices MixPre3, 128 GB", 2, "Sounddevices MixPre3"),
    seed("audio-rec-3", "Audio Recorder", "Zoom F8N Pro", 2, "Zoom F8n Pro"),
    seed("audio-mic-1", "Audio Mikrofon", "Sennheiser Me66, Angel, Windkorb, Deadcat", 4, "Sennheiser ME66"),
    seed("audio-mic-2", "Audio Mikrofon", "Røde NTG5, Angel, Windkorb, Deadcat", 5, "Rode NTG5"),
    seed("audio-mic-3", "Audio Mikrofon", "Sennheiser MKH416, Tonangel, Windkorb, Deadcat", 4, "Sennheiser MKH416"),
    seed("audio-mix-1", "Audio Mixer", "Alpha-Mix (analog, 4 inputs, stereo out)", 2, "Alpha Mix Audio"),
    seed("audio-hp-1", "Audio Kopfhörer", "Sennheiser HD25", 5, "Sennheiser HD25"),
    // Power and accessories
    seed("batt-1", "Akku", "NP-F570; 3350mAh", 25, "NP-F570 Akku"),
    seed("batt-2", "Akku", "NP-F970 6600mAh", 12, "NP-F970 Akku"),
    seed("batt-3", "Akku", "V-Mount, 95Wh", 12, "V-Mount Akku 95Wh"),
    seed("batt-4", "Akku", "V-Mount, 143Wh", 12, "V-Mount Akku 143Wh"),
    seed("batt-5", "Akku", "Set mit je 4x AA Akku + Ladegerät", 5, "AA Akkus Ladegerät"),
    seed("acc-1", "Zubehör", "XLR cables (various lengths)", 10, "XLR Kabel"),
    seed("acc-2", "Zubehör", "Gaffer Tape", 5, "Gaffer Tape"),
    seed("acc-3", "Zubehör", "Cable drum (20m)", 3, "Kabeltrommel 20m"),
    seed("acc-4", "Zubehör", "Cable drum (10m)", 3, "Kabeltrommel 10m"),
    seed("acc-5", "Zubehör", "Molton 3x3m", 3, "Bühnenmolton"),
];

/// Product link for a search query
#[must_use]
pub fn search_link(query: &str) -> String {
    format!("https://www.google.com/search?q={}", urlencoding::encode(query))
}

/// The default catalog as inventory records
#[must_use]
pub fn seed_inventory() -> Vec<InventoryItem> {
    SEED.iter()
        .map(|entry| InventoryItem {
            id: entry.id.to_string(),
            category: entry.category.to_string(),
            name: entry.name.to_string(),
            total_stock: entry.total_stock,
            link: Some(search_link(entry.search)),
            description: None,
            maintenance_notes: None,
        })
        .collect()
}

/// Position of an item in the default catalog; `None` for items added later
#[must_use]
pub fn catalog_rank(item_id: &str) -> Option<usize> {
    SEED.iter().position(|entry| entry.id == item_id)
}

/// Catalog order: default items first as listed, later additions by id
#[must_use]
pub fn catalog_order(a: &str, b: &str) -> Ordering {
    match (catalog_rank(a), catalog_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
