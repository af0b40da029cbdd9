mod echo;
mod front_end;
mod noise;

pub use echo::{EchoProfile, synthesize_frame};
pub use front_end::SimulatedFrontEnd;
pub use noise::NoiseConfig;
