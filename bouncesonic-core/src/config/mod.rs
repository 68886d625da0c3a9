mod engine_desc;
mod impulse;

pub use engine_desc::BounceSonicEngineDesc;
pub use impulse::ImpulseCurve;
