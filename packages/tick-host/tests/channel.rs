use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use tick_host::{
    Availability, CapabilitySet, EventLoop, HostError, MessageChannel, Primitive, TaskSource,
};

#[test]
fn test_message_reaches_peer_port() {
    let host = EventLoop::new(CapabilitySet::browser());
    let channel = MessageChannel::new(&host).unwrap();
    let received = Rc::new(RefCell::new(Vec::new()));

    {
        let received = received.clone();
        channel
            .port1
            .set_onmessage(move |data| received.borrow_mut().push(data));
    }

    channel.port2.post_message(json!(1)).unwrap();
    channel.port2.post_message(json!({ "n": 2 })).unwrap();
    assert!(received.borrow().is_empty());

    assert_eq!(host.run_turn(), Some(TaskSource::Message));
    assert_eq!(host.run_turn(), Some(TaskSource::Message));
    assert_eq!(*received.borrow(), vec![json!(1), json!({ "n": 2 })]);
    assert_eq!(host.stats().messages_posted, 2);
}

#[test]
fn test_messages_run_before_timers() {
    let host = EventLoop::new(CapabilitySet::browser());
    let channel = MessageChannel::new(&host).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    {
        let log = log.clone();
        channel
            .port1
            .set_onmessage(move |_| log.borrow_mut().push("message"));
    }
    {
        let log = log.clone();
        host.set_timeout(0, Box::new(move || log.borrow_mut().push("timer")));
    }
    channel.port2.post_message(json!(null)).unwrap();

    host.run_until_idle();
    assert_eq!(*log.borrow(), vec!["message", "timer"]);
}

#[test]
fn test_channel_requires_the_primitive() {
    let host = EventLoop::new(CapabilitySet::bare());
    assert_eq!(
        MessageChannel::new(&host).err(),
        Some(HostError::Unsupported(Primitive::MessageChannel))
    );
}

#[test]
fn test_messages_to_a_dropped_port_are_discarded() {
    let host = EventLoop::new(CapabilitySet::browser());
    let MessageChannel { port1, port2 } = MessageChannel::new(&host).unwrap();
    let hits = Rc::new(RefCell::new(0));

    {
        let hits = hits.clone();
        port1.set_onmessage(move |_| *hits.borrow_mut() += 1);
    }
    port2.post_message(json!(1)).unwrap();
    drop(port1);

    host.run_until_idle();
    assert_eq!(*hits.borrow(), 0);
}

#[test]
fn test_polyfilled_channel_delivers_through_timers() {
    let caps = CapabilitySet::bare().with(Primitive::MessageChannel, Availability::Polyfilled);
    let host = EventLoop::new(caps);
    let channel = MessageChannel::new(&host).unwrap();
    let hits = Rc::new(RefCell::new(0));

    {
        let hits = hits.clone();
        channel.port1.set_onmessage(move |_| *hits.borrow_mut() += 1);
    }
    channel.port2.post_message(json!(1)).unwrap();

    assert_eq!(host.run_turn(), Some(TaskSource::Timer));
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn test_replaced_handler_releases_ports_it_owns() {
    let host = EventLoop::new(CapabilitySet::browser());
    let channel = MessageChannel::new(&host).unwrap();
    let MessageChannel {
        port1: owned,
        port2: sender,
    } = MessageChannel::new(&host).unwrap();
    let received = Rc::new(RefCell::new(Vec::new()));

    {
        let received = received.clone();
        owned.set_onmessage(move |data| received.borrow_mut().push(data));
    }
    channel.port1.set_onmessage(move |_| {
        let _owned = &owned;
    });
    // Dropping the first handler closes the port it captured.
    channel.port1.set_onmessage(|_| {});

    sender.post_message(json!("late")).unwrap();
    host.run_until_idle();
    assert!(received.borrow().is_empty());
}
