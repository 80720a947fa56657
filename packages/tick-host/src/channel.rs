use crate::capability::Primitive;
use crate::error::HostError;
use crate::event_loop::{Delivery, EventLoop};
use slotmap::new_key_type;
use std::rc::Rc;

new_key_type! {
    pub struct PortId;
}

pub(crate) struct PortSlot {
    pub(crate) peer: PortId,
    pub(crate) onmessage: Option<Rc<dyn Fn(serde_json::Value)>>,
}

/// One end of a [`MessageChannel`]. Dropping a port closes it; messages still
/// in flight towards it are discarded.
pub struct MessagePort {
    host: EventLoop,
    id: PortId,
}

impl MessagePort {
    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn set_onmessage(&self, handler: impl Fn(serde_json::Value) + 'static) {
        let handler: Rc<dyn Fn(serde_json::Value)> = Rc::new(handler);
        let previous = {
            let mut ports = self.host.inner.ports.borrow_mut();
            match ports.get_mut(self.id) {
                Some(slot) => slot.onmessage.replace(handler),
                None => Some(handler),
            }
        };
        // The old handler may own ports whose `Drop` needs the table.
        drop(previous);
    }

    /// Queues `data` for the entangled port.
    pub fn post_message(&self, data: serde_json::Value) -> Result<(), HostError> {
        let peer = self
            .host
            .inner
            .ports
            .borrow()
            .get(self.id)
            .map(|slot| slot.peer)
            .ok_or(HostError::PortClosed)?;

        self.host.enqueue_delivery(Delivery { port: peer, data });
        Ok(())
    }
}

impl Drop for MessagePort {
    fn drop(&mut self) {
        if let Ok(mut ports) = self.host.inner.ports.try_borrow_mut() {
            ports.remove(self.id);
        }
    }
}

pub struct MessageChannel {
    pub port1: MessagePort,
    pub port2: MessagePort,
}

impl MessageChannel {
    pub fn new(host: &EventLoop) -> Result<Self, HostError> {
        if !host.probe().message_channel.is_present() {
            return Err(HostError::Unsupported(Primitive::MessageChannel));
        }

        let mut ports = host.inner.ports.borrow_mut();
        let first = ports.insert(PortSlot {
            peer: PortId::default(),
            onmessage: None,
        });
        let second = ports.insert(PortSlot {
            peer: first,
            onmessage: None,
        });
        if let Some(slot) = ports.get_mut(first) {
            slot.peer = second;
        }
        drop(ports);

        Ok(Self {
            port1: MessagePort {
                host: host.clone(),
                id: first,
            },
            port2: MessagePort {
                host: host.clone(),
                id: second,
            },
        })
    }
}
