pub mod feature;
pub mod layers;
pub mod map;
pub mod map_tile;
