//! Parsing of the strings carried by [`ConfigPacket`](crate::ConfigPacket).

use std::collections::BTreeMap;

use crate::{ConfigKind, ConfigPacket};

/// Most picture names or prefixes a client keeps from one config push.
pub const MAX_SYNC_PICTURES: usize = 500;

/// Most rooms a virtual 3D config may describe.
pub const MAX_VIRTUAL_3D_MAPS: usize = 100;

/// Per-room virtual 3D settings. `-1` means "not configured".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Virtual3dMapConfig {
    pub character_event_id: i32,
    pub terrain_id: i32,
    pub refresh_switch_id: i32,
}

/// Splits a comma-separated picture list.
///
/// A backslash escapes the next character, so `a\,b` is the single
/// entry `a,b`. Empty entries are dropped.
pub fn parse_picture_list(config: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut chars = config.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ',' => push_entry(&mut entries, &mut current),
            other => current.push(other),
        }
        if entries.len() >= MAX_SYNC_PICTURES {
            return entries;
        }
    }
    push_entry(&mut entries, &mut current);
    entries
}

fn push_entry(entries: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() && entries.len() < MAX_SYNC_PICTURES {
        entries.push(std::mem::take(current));
    }
    current.clear();
}

/// Parses `map,event,terrain,switch` records joined by `^`.
///
/// Missing trailing fields default to `-1`; a record without a map id
/// is skipped. Later records for the same map win.
pub fn parse_virtual_3d_maps(config: &str) -> BTreeMap<u16, Virtual3dMapConfig> {
    let mut maps = BTreeMap::new();
    for record in config.split('^') {
        let mut fields = record.split(',').map(str::trim);
        let Some(map_id) = fields.next().and_then(|f| f.parse::<u16>().ok()) else {
            continue;
        };
        let mut next = || fields.next().map_or(-1, |f| f.parse::<i32>().unwrap_or(0));
        let cfg = Virtual3dMapConfig {
            character_event_id: next(),
            terrain_id: next(),
            refresh_switch_id: next(),
        };
        if maps.len() < MAX_VIRTUAL_3D_MAPS || maps.contains_key(&map_id) {
            maps.insert(map_id, cfg);
        }
    }
    maps
}

/// Everything the server has pushed through CONFIG packets so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub picture_names: Vec<String>,
    pub picture_prefixes: Vec<String>,
    pub virtual_3d_maps: BTreeMap<u16, Virtual3dMapConfig>,
}

impl SyncConfig {
    /// Replaces the one setting `packet` carries.
    pub fn apply(&mut self, packet: &ConfigPacket) {
        match packet.kind {
            ConfigKind::PictureNames => self.picture_names = parse_picture_list(&packet.config),
            ConfigKind::PicturePrefixes => {
                self.picture_prefixes = parse_picture_list(&packet.config);
            }
            ConfigKind::Virtual3dMaps => {
                self.virtual_3d_maps = parse_virtual_3d_maps(&packet.config);
            }
        }
    }

    /// True when a picture called `name` is listed by name or prefix.
    pub fn syncs_picture(&self, name: &str) -> bool {
        self.picture_names.iter().any(|n| n == name)
            || self.picture_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}
