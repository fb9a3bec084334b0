pub mod donchian;
pub mod volatility;

pub use donchian::calculate_donchian;
pub use volatility::{calculate_n, true_range, wilder_step};
