//! The per-client state cache replayed to late joiners.

use std::collections::BTreeMap;

use roomcast_protocol::{
    FacingPacket, HasPlayerId, HiddenPacket, JoinPacket, Message, MovePacket, MovePicturePacket,
    NamePacket, RepeatingFlashPacket, ShowPicturePacket, SpeedPacket, SpritePacket,
    SystemGraphicPacket,
};

/// Pictures a single client may have cached at once.
pub const MAX_CACHED_PICTURES: usize = 200;

/// The most recent state-carrying packets a client sent.
///
/// Nobody stores the world. When a client enters a room, everyone
/// already there is reconstructed for it from these caches instead.
#[derive(Debug, Clone, PartialEq)]
pub struct LastState {
    pub position: MovePacket,
    pub facing: FacingPacket,
    pub speed: SpeedPacket,
    pub sprite: SpritePacket,
    pub repeating_flash: RepeatingFlashPacket,
    pub hidden: HiddenPacket,
    pub system: SystemGraphicPacket,
    pictures: BTreeMap<u16, ShowPicturePacket>,
}

impl Default for LastState {
    fn default() -> Self {
        let mut repeating_flash = RepeatingFlashPacket::default();
        repeating_flash.discard();
        Self {
            position: MovePacket::default(),
            facing: FacingPacket::default(),
            speed: SpeedPacket::default(),
            sprite: SpritePacket::default(),
            repeating_flash,
            hidden: HiddenPacket::default(),
            system: SystemGraphicPacket::default(),
            pictures: BTreeMap::new(),
        }
    }
}

impl LastState {
    /// Caches a shown picture. A picture id already cached is replaced;
    /// a new one is dropped once [`MAX_CACHED_PICTURES`] are held.
    /// Returns whether the picture is now cached.
    pub fn show_picture(&mut self, picture: ShowPicturePacket) -> bool {
        let pic_id = picture.placement.pic_id;
        if !self.pictures.contains_key(&pic_id) && self.pictures.len() >= MAX_CACHED_PICTURES {
            tracing::debug!(pic_id, "picture cache full, not caching");
            return false;
        }
        self.pictures.insert(pic_id, picture);
        true
    }

    /// Folds a move into the cached picture, if it is cached.
    pub fn move_picture(&mut self, mv: &MovePicturePacket) {
        if let Some(picture) = self.pictures.get_mut(&mv.placement.pic_id) {
            picture.apply_move(mv);
        }
    }

    pub fn erase_picture(&mut self, pic_id: u16) {
        self.pictures.remove(&pic_id);
    }

    pub fn clear_pictures(&mut self) {
        self.pictures.clear();
    }

    pub fn picture_count(&self) -> usize {
        self.pictures.len()
    }

    /// Serialized sub-messages that recreate this client, stamped with
    /// `id`, for a newcomer.
    ///
    /// Order: join, position, then facing, speed, name, sprite, repeating
    /// flash, hidden flag and system graphic when they differ from the
    /// defaults, then every cached picture by picture id.
    pub fn replay(&self, id: u16, name: &str) -> Vec<Vec<u8>> {
        let mut out = vec![
            JoinPacket { id }.to_bytes(),
            self.position.with_player_id(id).to_bytes(),
        ];
        if self.facing.facing != 0 {
            out.push(self.facing.with_player_id(id).to_bytes());
        }
        if self.speed.speed != 0 {
            out.push(self.speed.with_player_id(id).to_bytes());
        }
        if !name.is_empty() {
            out.push(NamePacket { id, name: name.to_string() }.to_bytes());
        }
        if self.sprite.is_set() {
            out.push(self.sprite.clone().with_player_id(id).to_bytes());
        }
        if self.repeating_flash.is_available() {
            out.push(self.repeating_flash.with_player_id(id).to_bytes());
        }
        if self.hidden.is_hidden {
            out.push(self.hidden.with_player_id(id).to_bytes());
        }
        if !self.system.name.is_empty() {
            out.push(self.system.clone().with_player_id(id).to_bytes());
        }
        for picture in self.pictures.values() {
            out.push(picture.clone().with_player_id(id).to_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_protocol::{FlashColor, Packet, PacketType, SubMessages};

    fn replay_types(state: &LastState, name: &str) -> Vec<PacketType> {
        let bulk = state.replay(20, name).concat();
        SubMessages::new(&bulk)
            .map(|sub| Packet::from_payload(sub.unwrap()).unwrap().packet_type())
            .collect()
    }

    fn picture(pic_id: u16) -> ShowPicturePacket {
        let mut p = ShowPicturePacket::default();
        p.placement.pic_id = pic_id;
        p
    }

    #[test]
    fn test_fresh_state_replays_join_and_position_only() {
        assert_eq!(
            replay_types(&LastState::default(), ""),
            vec![PacketType::Join, PacketType::Move]
        );
    }

    #[test]
    fn test_full_replay_order() {
        let mut state = LastState::default();
        state.facing = FacingPacket::new(2);
        state.speed = SpeedPacket::new(4);
        state.sprite = SpritePacket::new("hero", 3);
        state.repeating_flash = RepeatingFlashPacket::new(FlashColor::default());
        state.hidden = HiddenPacket::new(true);
        state.system = SystemGraphicPacket::new("skin");
        state.show_picture(picture(9));
        state.show_picture(picture(1));

        assert_eq!(
            replay_types(&state, "alex"),
            vec![
                PacketType::Join,
                PacketType::Move,
                PacketType::Facing,
                PacketType::Speed,
                PacketType::Name,
                PacketType::Sprite,
                PacketType::RepeatingFlash,
                PacketType::Hidden,
                PacketType::SystemGraphic,
                PacketType::ShowPicture,
                PacketType::ShowPicture,
            ]
        );
    }

    #[test]
    fn test_replay_is_stamped_with_owner_id() {
        let mut state = LastState::default();
        state.sprite = SpritePacket::new("hero", 3);
        let sprite = &state.replay(33, "")[2];
        let payload = SubMessages::new(sprite).next().unwrap().unwrap();
        assert_eq!(
            Packet::from_payload(payload).unwrap(),
            Packet::from(SpritePacket::new("hero", 3).with_player_id(33))
        );
    }

    #[test]
    fn test_discarded_flash_is_not_replayed() {
        let mut state = LastState::default();
        state.repeating_flash = RepeatingFlashPacket::new(FlashColor::default());
        state.repeating_flash.discard();
        assert!(!replay_types(&state, "").contains(&PacketType::RepeatingFlash));
    }

    #[test]
    fn test_picture_cache_cap() {
        let mut state = LastState::default();
        for pic_id in 0..MAX_CACHED_PICTURES as u16 {
            assert!(state.show_picture(picture(pic_id)));
        }
        assert!(!state.show_picture(picture(500)));
        // Replacing an already cached picture still works when full.
        assert!(state.show_picture(picture(0)));
        assert_eq!(state.picture_count(), MAX_CACHED_PICTURES);

        state.erase_picture(0);
        assert!(state.show_picture(picture(500)));
    }

    #[test]
    fn test_move_picture_updates_cached_entry() {
        let mut state = LastState::default();
        let mut shown = picture(4);
        shown.name = "sun".into();
        state.show_picture(shown);

        let mut mv = MovePicturePacket::default();
        mv.placement.pic_id = 4;
        mv.placement.map_x = 12;
        mv.params.magnify = 150;
        state.move_picture(&mv);

        let cached = &state.pictures[&4];
        assert_eq!(cached.placement.map_x, 12);
        assert_eq!(cached.params.magnify, 150);
        assert_eq!(cached.name, "sun");
    }
}
