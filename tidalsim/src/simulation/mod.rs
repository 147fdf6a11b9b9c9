pub mod states;
pub mod params;
pub mod engine;
pub mod potential;
pub mod coordinates;
pub mod initial;
pub mod barnes_hut;
pub mod forces;
pub mod integrator;
pub mod histogram;
pub mod scenario;
