use std::{
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use prefetch_pipe::{queue::BlockingQueue, Killed};

#[test]
fn fifo_within_capacity() -> Result<(), Killed> {
    let queue = BlockingQueue::new(3);
    assert!(queue.is_empty());

    queue.push(1)?;
    queue.push(2)?;
    queue.push(3)?;
    assert_eq!(queue.len(), 3);

    assert_eq!(queue.pop()?, 1);
    assert_eq!(queue.pop()?, 2);
    assert_eq!(queue.pop()?, 3);
    assert!(queue.is_empty());

    Ok(())
}

#[test]
fn push_waits_for_room() -> Result<(), Killed> {
    let queue = Arc::new(BlockingQueue::new(1));
    queue.push(1)?;

    let (tx, rx) = mpsc::channel();
    let pusher = {
        let queue = queue.clone();
        thread::spawn(move || {
            let result = queue.push(2);
            tx.send(()).unwrap();
            result
        })
    };

    // The queue is full, so the pusher has to wait for us.
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    assert_eq!(queue.pop()?, 1);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    pusher.join().unwrap()?;

    assert_eq!(queue.pop()?, 2);

    Ok(())
}

#[test]
fn kill_wakes_blocked_callers() {
    let queue = Arc::new(BlockingQueue::<u32>::new(2));

    let poppers: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    queue.kill();

    for popper in poppers {
        assert_eq!(popper.join().unwrap(), Err(Killed));
    }
    assert!(queue.is_killed());
}

#[test]
fn killed_queue_fails_and_clears() -> Result<(), Killed> {
    let queue = BlockingQueue::new(4);
    queue.push("a")?;
    queue.push("b")?;

    queue.kill();

    assert_eq!(queue.push("c"), Err(Killed));
    assert_eq!(queue.pop(), Err(Killed));
    assert_eq!(queue.len(), 2);

    assert_eq!(queue.clear(), 2);
    assert!(queue.is_empty());

    Ok(())
}

#[test]
#[should_panic(expected = "non-zero")]
fn zero_capacity() {
    BlockingQueue::<u8>::new(0);
}
