pub mod bandpass;
pub mod history;
pub mod peaks;
pub mod preprocess;
pub mod shape;
pub mod zero_crossing;

pub use bandpass::{Bandpass, BandpassBandwidth};
pub use history::HistoryRing;
pub use peaks::{Constellation, Peak, capture_peaks, capture_peaks_from};
pub use shape::{ShapeMatch, match_shape};
pub use zero_crossing::find_crossings;
