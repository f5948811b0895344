//! Market-name classification.
//!
//! Market names follow `<weapon> | <skin> (<wear>)`, e.g.
//! `StatTrak™ AK-47 | Redline (Field-Tested)`. Knives carry a `★` prefix on the
//! weapon part. Anything without a `|` (cases, stickers, keys) is `other`.

use crate::types::{ItemClass, ItemType};

pub const NO_WEAR: &str = "Not Applicable";

pub fn classify(market_name: &str) -> ItemClass {
    let name = market_name.trim();

    let Some((weapon, rest)) = name.split_once('|') else {
        return ItemClass {
            item_type: ItemType::Other,
            weapon: name.to_string(),
            skin: None,
            wear: NO_WEAR.to_string(),
        };
    };

    let weapon = weapon.trim();
    let rest = rest.trim();

    let (skin, wear) = match (rest.rfind('('), rest.rfind(')')) {
        (Some(open), Some(close)) if open < close => (
            rest[..open].trim(),
            rest[open + 1..close].trim(),
        ),
        _ => (rest, NO_WEAR),
    };

    let item_type = if weapon.contains('★') {
        ItemType::Knife
    } else {
        ItemType::Weapon
    };

    ItemClass {
        item_type,
        weapon: weapon.to_string(),
        skin: (!skin.is_empty()).then(|| skin.to_string()),
        wear: if wear.is_empty() { NO_WEAR.to_string() } else { wear.to_string() },
    }
}
