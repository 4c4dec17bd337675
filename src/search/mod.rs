pub mod fuzzy;
pub mod normalize;
