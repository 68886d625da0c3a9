//! Balls dropped onto a floor; every bounce plays a collision cue.

use crate::synth::SynthLoader;
use anyhow::Result;
use bouncesonic_core::{
    BounceSonicEngine, BounceSonicEngineDesc, BounceSonicEvent, CpalOutput, GameObjectHandle,
    ManualOutput, ManualOutputHandle, Pose, Vec3,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

const BALLS: usize = 6;
const STEP_HZ: u32 = 120;
const GRAVITY: f32 = -9.81;
const RADIUS: f32 = 0.15;
const RESTITUTION: f32 = 0.7;
const MASS: f32 = 0.4;
/// Below this vertical speed a ball is considered at rest and respawned
const REST_SPEED: f32 = 0.4;

struct Ball {
    handle: GameObjectHandle,
    position: Vec3,
    velocity: Vec3,
}

impl Ball {
    fn spawn(handle: GameObjectHandle, rng: &mut impl Rng) -> Self {
        Self {
            handle,
            position: Vec3::new(
                rng.gen_range(-4.0..4.0),
                rng.gen_range(2.0..6.0),
                rng.gen_range(-4.0..2.0),
            ),
            velocity: Vec3::new(rng.gen_range(-1.0..1.0), 0.0, rng.gen_range(-1.0..1.0)),
        }
    }

    /// Advance one step. Returns the impulse if the ball hit the floor.
    fn step(&mut self, dt: f32) -> Option<f32> {
        self.velocity.y += GRAVITY * dt;
        self.position += self.velocity * dt;

        if self.position.y < RADIUS && self.velocity.y < 0.0 {
            let impulse = -self.velocity.y * MASS * 10.0;
            self.position.y = RADIUS;
            self.velocity.y = -self.velocity.y * RESTITUTION;
            self.velocity.x *= 0.9;
            self.velocity.z *= 0.9;
            return Some(impulse);
        }
        None
    }

    fn at_rest(&self) -> bool {
        self.position.y <= RADIUS + f32::EPSILON && self.velocity.y.abs() < REST_SPEED
    }
}

pub fn run(headless: bool, seconds: f32) -> Result<()> {
    let desc = BounceSonicEngineDesc::new()
        .assets("assets/bounce.wav", "assets/launchSound.wav")
        .listener(Pose::from_position(Vec3::new(0.0, 1.7, 6.0)));
    let loader = Arc::new(SynthLoader::default());

    let (engine, manual) = if headless {
        let (output, handle) = ManualOutput::new(2, desc.sample_rate);
        (
            BounceSonicEngine::with_output_and_loader(desc, Box::new(output), loader)?,
            Some(handle),
        )
    } else {
        let output = CpalOutput::new(desc.sample_rate, desc.block_size);
        (
            BounceSonicEngine::with_output_and_loader(desc, Box::new(output), loader)?,
            None,
        )
    };

    engine.start()?;
    log::info!(
        "Rendering to {:?} ({} mode)",
        engine.output_layout(),
        if headless { "headless" } else { "device" }
    );

    engine.play_launch_sound(|outcome| log::info!("Launch cue finished: {:?}", outcome))?;

    let mut rng = rand::thread_rng();
    let mut next_id = 1u64;
    let mut balls = Vec::with_capacity(BALLS);
    for _ in 0..BALLS {
        let handle = GameObjectHandle::new(next_id);
        next_id += 1;
        engine.create_player(handle)?;
        balls.push(Ball::spawn(handle, &mut rng));
    }

    let dt = 1.0 / STEP_HZ as f32;
    let frames_per_step = (engine.desc().sample_rate / STEP_HZ) as usize;
    let steps = (seconds * STEP_HZ as f32) as usize;
    let mut stats = Stats::default();

    for _ in 0..steps {
        for ball in balls.iter_mut() {
            if let Some(impulse) = ball.step(dt) {
                if let Err(e) = engine.play_collision(ball.handle, ball.position, impulse) {
                    log::warn!("Collision for {} dropped: {}", ball.handle, e);
                }
                stats.collisions += 1;
            }

            if ball.at_rest() {
                engine.destroy_player(ball.handle)?;
                let handle = GameObjectHandle::new(next_id);
                next_id += 1;
                engine.create_player(handle)?;
                *ball = Ball::spawn(handle, &mut rng);
                stats.respawns += 1;
            }
        }

        match &manual {
            Some(output) => stats.observe(output, frames_per_step),
            None => std::thread::sleep(Duration::from_secs_f32(dt)),
        }

        for event in engine.poll_events() {
            report(&event, &mut stats);
        }
    }

    engine.stop()?;
    for event in engine.poll_events() {
        report(&event, &mut stats);
    }

    log::info!(
        "{} collisions, {} finished, {} respawns, peak {:.3}",
        stats.collisions,
        stats.finished,
        stats.respawns,
        stats.peak
    );
    Ok(())
}

#[derive(Default)]
struct Stats {
    collisions: usize,
    finished: usize,
    respawns: usize,
    peak: f32,
}

impl Stats {
    fn observe(&mut self, output: &ManualOutputHandle, frames: usize) {
        let block = output.render(frames);
        let peak = block.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        self.peak = self.peak.max(peak);
    }
}

fn report(event: &BounceSonicEvent, stats: &mut Stats) {
    match event {
        BounceSonicEvent::CollisionFinished { .. } => stats.finished += 1,
        event if event.is_error() => log::warn!("{:?}", event),
        event => log::info!("{:?}", event),
    }
}
