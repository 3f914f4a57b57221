//! Basic usage of a standalone [`Reservoir`], including a custom lifecycle strategy.

use reuse_pool::{ErrorKind, HookError, Lifecycle, Poolable, Reservoir};

#[derive(Default)]
struct Particle {
    age: u32,
}

impl Poolable for Particle {
    fn on_acquired(&mut self) {
        self.age = 0;
    }
}

/// Hands out pre-sized byte buffers and clears them whenever they come back.
struct BufferLifecycle {
    size: usize,
}

impl Lifecycle<Vec<u8>> for BufferLifecycle {
    fn create(&self) -> Result<Vec<u8>, HookError> {
        Ok(Vec::with_capacity(self.size))
    }

    fn activate(&self, _buffer: &mut Vec<u8>) -> Result<(), HookError> {
        Ok(())
    }

    fn quiesce(&self, buffer: &mut Vec<u8>) -> Result<(), HookError> {
        buffer.clear();
        Ok(())
    }

    fn finalize(&self, _buffer: Vec<u8>) -> Result<(), HookError> {
        Ok(())
    }
}

fn main() {
    println!("=== Particles ===");

    let mut particles = Reservoir::<Particle>::builder()
        .initial_size(4)
        .maximum_size(4)
        .build_in_process()
        .unwrap();

    println!("After warm-up: {particles:?}");

    let keys: Vec<_> = (0..4).map(|_| particles.acquire().unwrap()).collect();

    for (age, key) in (1..).zip(&keys) {
        particles.get_mut(*key).unwrap().age = age;
    }

    match particles.acquire() {
        Err(error) if error.kind() == ErrorKind::CapacityExceeded => {
            println!("Fifth particle rejected: {error}");
        }
        other => println!("Unexpected result: {other:?}"),
    }

    particles.release_all().unwrap();
    println!(
        "After release_all: active={}, idle={}, created={}",
        particles.active_len(),
        particles.idle_len(),
        particles.created_count()
    );

    println!();
    println!("=== Buffers ===");

    let mut buffers = Reservoir::<Vec<u8>>::builder()
        .type_key("scratch_buffer")
        .initial_size(2)
        .build(BufferLifecycle { size: 4096 })
        .unwrap();

    let key = buffers.acquire().unwrap();
    buffers.get_mut(key).unwrap().extend_from_slice(b"payload");
    println!("Buffer in use holds {} bytes", buffers.get(key).unwrap().len());

    buffers.release(key).unwrap();

    let key = buffers.acquire().unwrap();
    let buffer = buffers.get(key).unwrap();
    println!(
        "Reused buffer holds {} bytes with capacity {}",
        buffer.len(),
        buffer.capacity()
    );

    buffers.destroy_all().unwrap();
    println!("After destroy_all: {buffers:?}");
}
