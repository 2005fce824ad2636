mod betas;
mod params;

pub use betas::{BetaSchedule, NoiseSchedule};
pub use params::{make_timesteps, Discretization, ReverseStep, ScheduleParams, StepParams};
