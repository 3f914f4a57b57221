//! Building a [`Registry`] from a TOML document and using it through the per-thread facade.

use reuse_pool::{PoolConfig, Poolable, Registry, ResultExt, global};

const CONFIG: &str = r#"
[[pool]]
type_key = "bullet"
initial_size = 32
default_capacity = 64
maximum_size = 256

[[pool]]
type_key = "spark"
maximum_size = 8
"#;

#[derive(Default)]
struct Bullet {
    speed: f32,
}

impl Poolable for Bullet {
    fn on_acquired(&mut self) {
        self.speed = 300.0;
    }
}

#[derive(Default)]
struct Spark;

impl Poolable for Spark {}

#[derive(Default)]
struct Missile;

impl Poolable for Missile {}

fn main() {
    let configs = PoolConfig::parse_toml(CONFIG).unwrap();

    let registry = Registry::builder()
        .register::<Bullet>("bullet")
        .register::<Spark>("spark")
        .build(&configs)
        .unwrap();

    println!("Registry pools: {:?}", registry.type_keys().collect::<Vec<_>>());

    global::install(registry).unwrap();

    let bullets: Vec<_> = (0..10)
        .map(|_| global::acquire::<Bullet>().unwrap())
        .collect();

    global::with(|registry| {
        let speed = bullets
            .first()
            .and_then(|key| registry.get(*key))
            .map(|bullet| bullet.speed);
        println!("First bullet speed: {speed:?}");
    })
    .unwrap();

    // Missiles were never configured. Log the problem and carry on.
    let missile = global::acquire::<Missile>().or_log();
    println!("Missile acquired: {}", missile.is_some());

    global::release_all::<Bullet>().unwrap();

    let registry = global::uninstall().unwrap();
    let reservoir = registry.reservoir::<Bullet>().unwrap();
    println!(
        "Bullets after release_all: active={}, idle={}",
        reservoir.active_len(),
        reservoir.idle_len()
    );
}
