//! Example demonstrating basic usage of `Registry`.
//!
//! Shows named and unnamed bindings, lookups from other threads, snapshot handles across
//! overwrites and what happens when the pool runs out of room.

use std::thread;

use new_zealand::nz;
use pooled_registry::{Error, Registry};

#[derive(Debug)]
struct Player {
    name: String,
    score: u32,
}

fn main() {
    println!("=== Registry: keyed pooled objects ===");

    let players = Registry::<Player>::builder().capacity(nz!(4)).build();

    players
        .create("p1", Player {
            name: "Alice".to_string(),
            score: 120,
        })
        .unwrap();

    let bob = players
        .create_unnamed(Player {
            name: "Bob".to_string(),
            score: 80,
        })
        .unwrap();

    println!("Bob was bound under {}", bob.id());

    // Lookups work from any thread.
    thread::scope(|s| {
        s.spawn(|| {
            let p1 = players.find("p1").unwrap();
            println!("From thread: {} has {} points", p1.name, p1.score);
        });
    });

    // Overwriting does not affect handles that were obtained earlier.
    let old = players.find("p1").unwrap();
    players
        .create("p1", Player {
            name: "Alice".to_string(),
            score: 150,
        })
        .unwrap();

    println!("Old handle: {:?}", *old);
    println!("New lookup: {:?}", *players.find("p1").unwrap());

    // The pool holds at most 4 live players, including ones only referenced by handles.
    let mut created = 0;
    loop {
        match players.create_unnamed(Player {
            name: "Extra".to_string(),
            score: 0,
        }) {
            Ok(_) => created += 1,
            Err(error @ Error::OutOfCapacity { .. }) => {
                println!("Stopped after {created} extra players: {error}");
                break;
            }
            Err(error) => panic!("unexpected error: {error}"),
        }
    }

    println!(
        "Bindings: {}, live instances: {}/{}",
        players.len(),
        players.live_instances(),
        players.capacity()
    );
}
