//! Route-tagged packets flowing between pipes, processors and endpoints

use crate::packet::ControlPacket;
use crate::proxy::pipe::PipeStatus;

/// Where the core sends a packet next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Write to the peer endpoint
    Forward,
    /// Write back to the originating endpoint
    Loopback,
    /// Hand to the originating endpoint's processor
    Process,
}

/// Payload of a routed packet
///
/// `Ready` is the synthetic marker a pipe publishes before its first read,
/// letting processors initialise per-connection state without a separate
/// lifecycle API.
#[derive(Debug)]
pub enum PacketBody {
    Ready,
    Control(ControlPacket),
}

/// One route-tagged packet
///
/// Immutable once constructed. Pipes publish `Process`-routed packets;
/// processors emit `Forward`- or `Loopback`-routed ones.
#[derive(Debug)]
pub struct Packet {
    body: PacketBody,
    status: Option<PipeStatus>,
    route: Route,
}

impl Packet {
    /// Creates a packet with an explicit route.
    #[must_use]
    pub fn new(packet: ControlPacket, route: Route) -> Self {
        Self {
            body: PacketBody::Control(packet),
            status: None,
            route,
        }
    }

    /// Creates a `Forward`-routed packet for the peer endpoint.
    #[must_use]
    pub fn forward(packet: ControlPacket) -> Self {
        Self::new(packet, Route::Forward)
    }

    /// Creates a `Loopback`-routed packet for the originating endpoint.
    #[must_use]
    pub fn loopback(packet: ControlPacket) -> Self {
        Self::new(packet, Route::Loopback)
    }

    /// Creates the `Process`-routed packet a pipe publishes.
    pub(crate) fn published(body: PacketBody, status: Option<PipeStatus>) -> Self {
        Self {
            body,
            status,
            route: Route::Process,
        }
    }

    #[must_use]
    pub fn control_packet(&self) -> Option<&ControlPacket> {
        match &self.body {
            PacketBody::Ready => None,
            PacketBody::Control(packet) => Some(packet),
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<&PipeStatus> {
        self.status.as_ref()
    }

    #[must_use]
    pub fn route(&self) -> Route {
        self.route
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.body, PacketBody::Ready)
    }

    /// Decomposes the packet for processors that consume it.
    #[must_use]
    pub fn into_parts(self) -> (PacketBody, Option<PipeStatus>, Route) {
        (self.body, self.status, self.route)
    }
}

/// Ordered, append-only bag of packets emitted by one processor invocation
#[derive(Debug, Default)]
pub struct Packets {
    items: Vec<Packet>,
}

impl Packets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: Packet) {
        self.items.push(packet);
    }

    /// Appends every packet of `other`, preserving order.
    pub fn append(&mut self, mut other: Packets) {
        self.items.append(&mut other.items);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Packet> {
        self.items.iter()
    }
}

impl IntoIterator for Packets {
    type Item = Packet;
    type IntoIter = std::vec::IntoIter<Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl FromIterator<Packet> for Packets {
    fn from_iter<I: IntoIterator<Item = Packet>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
