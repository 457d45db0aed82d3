#![allow(clippy::too_many_arguments, clippy::collapsible_if,
         clippy::needless_range_loop, clippy::comparison_chain)]

pub mod fixmath;
pub mod level;
pub mod collide;
pub mod amove;
