pub mod beatmap;
pub mod lookup;
pub mod mods;
pub mod playback;
pub mod replay;
pub mod visibility;
