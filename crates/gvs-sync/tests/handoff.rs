// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cross-thread behavior of `HandoffQueue`.
#![allow(clippy::unwrap_used)]

use gvs_sync::{ErasedCallback, HandoffQueue};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::thread;

/// Two threads hand a counter back and forth through two queues; each side
/// records the value it receives and passes on the successor.
#[test]
fn ping_pong_handoff_produces_ascending_sequence() {
    let ping = Arc::new(HandoffQueue::<u32>::new());
    let pong = Arc::new(HandoffQueue::<u32>::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let spawn_player = |inbox: Arc<HandoffQueue<u32>>, outbox: Arc<HandoffQueue<u32>>| {
        let seen = Arc::clone(&seen);
        thread::spawn(move || loop {
            let value = inbox.pop_blocking();
            if value >= 10 {
                return;
            }
            seen.lock().unwrap().push(value);
            outbox.push(value + 1);
        })
    };

    let a = spawn_player(Arc::clone(&ping), Arc::clone(&pong));
    let b = spawn_player(Arc::clone(&pong), Arc::clone(&ping));

    ping.push(0);
    // `b` receives 9 and hands 10 back to `a`, which stops; release `b`
    a.join().unwrap();
    pong.push(10);
    b.join().unwrap();

    assert!(ping.is_empty());
    assert!(pong.is_empty());
    assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn consumer_callback_drains_through_erased_callback() {
    let queue = Arc::new(HandoffQueue::new());
    let collected = Arc::new(Mutex::new(Vec::new()));
    let mut forward: ErasedCallback<String> = ErasedCallback::bind(
        Arc::clone(&collected),
        |sink: &mut Arc<Mutex<Vec<String>>>, line| sink.lock().unwrap().push(line),
    );

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || loop {
            match queue.pop_blocking() {
                Some(line) => forward.invoke(line),
                None => return,
            }
        })
    };

    for word in ["alpha", "beta", "gamma"] {
        queue.push(Some(word.to_string()));
    }
    queue.push(None);
    consumer.join().unwrap();

    assert_eq!(*collected.lock().unwrap(), vec!["alpha", "beta", "gamma"]);
}

proptest! {
    #[test]
    fn pops_return_pushes_in_order(values in proptest::collection::vec(any::<i64>(), 0..64)) {
        let queue = HandoffQueue::new();
        for v in &values {
            queue.push(*v);
        }
        let popped: Vec<i64> = (0..values.len()).map(|_| queue.pop_blocking()).collect();
        prop_assert_eq!(popped, values);
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn collapse_returns_last_push(values in proptest::collection::vec(any::<u16>(), 1..32)) {
        let queue = HandoffQueue::new();
        for v in &values {
            queue.push(*v);
        }
        prop_assert_eq!(queue.collapse_to_latest(), Ok(*values.last().unwrap()));
        prop_assert_eq!(queue.size(), 1);
    }
}
