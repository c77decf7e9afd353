use crate::trace::SimulationReport;
use rand::Rng;
use serde::Serialize;
use sr_lab_abstract::{Message, Packet, SimConfig};
use sr_lab_abstract::{SystemContext, TransportProtocol};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use tracing::{debug, info};

/// Value written over a header field when the channel mangles it.
const MANGLED_FIELD: i32 = 999_999;

/// Counter a sender bumps when it refuses a message.
pub const WINDOW_FULL_METRIC: &str = "window_full";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }
}

#[derive(Debug)]
pub enum EventType {
    PacketArrival {
        to: NodeId,
        packet: Packet,
    },
    TimerExpiry {
        node: NodeId,
        timer_id: u32,
        generation: u64,
    },
    AppSend {
        message: Message,
    },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important link-layer events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
enum TimerCommand {
    Start { delay: u64, timer_id: u32 },
    Cancel { timer_id: u32 },
}

/// Actions buffered during a protocol callback
#[derive(Default)]
struct ActionBuffer {
    outgoing_packets: Vec<Packet>,
    // Kept in call order so a cancel followed by a restart of the same id works.
    timers: Vec<TimerCommand>,
    logs: Vec<String>,
    delivered_data: Vec<Vec<u8>>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to the protocol roles
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: u64,
}

impl<'a> SystemContext for ScopedContext<'a> {
    fn send_packet(&mut self, packet: Packet) {
        self.buffer.outgoing_packets.push(packet);
    }

    fn start_timer(&mut self, delay: u64, timer_id: u32) {
        self.buffer
            .timers
            .push(TimerCommand::Start { delay, timer_id });
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.buffer.timers.push(TimerCommand::Cancel { timer_id });
    }

    fn deliver_data(&mut self, data: &[u8]) {
        self.buffer.delivered_data.push(data.to_vec());
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

/// Discrete-event emulator of an unreliable link between two protocol roles.
///
/// Packets may be lost, corrupted and delayed by a random latency, which also
/// reorders them. All randomness comes from a seeded RNG, so a run is fully
/// determined by its [`SimConfig`] and scheduled events.
pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    pub sender: Box<dyn TransportProtocol>,
    pub receiver: Box<dyn TransportProtocol>,

    /// Messages handed to the sender, in the order it saw them.
    pub app_messages: Vec<Message>,
    /// Subset of `app_messages` the sender took responsibility for, i.e. not
    /// refused with a full window.
    pub accepted_messages: Vec<Message>,
    pub delivered_data: Vec<Vec<u8>>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,

    /// Time series recorded via `SystemContext::record_metric`.
    /// Key: metric name (e.g., "packets_resent"), Value: Vec<(time, value)>
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    // Deterministic fault injection: drop first packet from Sender with given seq numbers
    drop_sender_seq_once: Vec<i32>,
    // Deterministic fault injection: drop first ACK from Receiver with given ack numbers
    drop_receiver_ack_once: Vec<i32>,
    // Deterministic fault injection: corrupt first packet from Sender with given seq numbers
    corrupt_sender_seq_once: Vec<i32>,

    /// Timeline of link events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,

    /// Timer generations to handle cancellation.
    /// Key: (node, timer_id), Value: generation counter
    timer_generations: HashMap<(NodeId, u32), u64>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        sender: Box<dyn TransportProtocol>,
        receiver: Box<dyn TransportProtocol>,
    ) -> Self {
        use rand::SeedableRng;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            rng,
            sender,
            receiver,
            app_messages: Vec::new(),
            accepted_messages: Vec::new(),
            delivered_data: Vec::new(),
            sender_packet_count: 0,
            receiver_packet_count: 0,
            metrics: HashMap::new(),
            drop_sender_seq_once: Vec::new(),
            drop_receiver_ack_once: Vec::new(),
            corrupt_sender_seq_once: Vec::new(),
            link_events: Vec::new(),
            timer_generations: HashMap::new(),
        }
    }

    /// Register a deterministic fault: drop the first packet sent by Sender whose seq equals `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: i32) {
        self.drop_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: drop the first ACK sent by Receiver whose ack equals `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: i32) {
        self.drop_receiver_ack_once.push(ack);
    }

    /// Register a deterministic fault: corrupt the payload of the first packet sent by Sender
    /// whose seq equals `seq`.
    pub fn add_corrupt_sender_seq_once(&mut self, seq: i32) {
        self.corrupt_sender_seq_once.push(seq);
    }

    fn latest_metric(&self, name: &str) -> f64 {
        self.metrics
            .get(name)
            .and_then(|series| series.last())
            .map_or(0.0, |&(_, v)| v)
    }

    /// Last recorded value of every metric.
    pub fn final_metrics(&self) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .filter_map(|(name, series)| series.last().map(|&(_, v)| (name.clone(), v)))
            .collect()
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn schedule_app_send(&mut self, time: u64, message: Message) {
        self.push_event(time, EventType::AppSend { message });
    }

    pub fn init(&mut self) {
        {
            let mut buffer = ActionBuffer::default();
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            self.sender.init(&mut ctx);
            self.process_actions(NodeId::Sender, buffer);
        }
        {
            let mut buffer = ActionBuffer::default();
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            self.receiver.init(&mut ctx);
            self.process_actions(NodeId::Receiver, buffer);
        }
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    /// Process the next event. Returns true if an event was processed, false if
    /// the queue is empty or the next event lies past the time limit.
    pub fn step(&mut self) -> bool {
        if let (Some(limit), Some(next)) = (self.config.time_limit, self.peek_next_event_time())
            && next > limit
        {
            debug!("Next event at {} is past the time limit {}", next, limit);
            return false;
        }

        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = event.time;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::PacketArrival { to, packet } => {
                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    match to {
                        NodeId::Sender => self.sender.on_packet(&mut ctx, packet),
                        NodeId::Receiver => self.receiver.on_packet(&mut ctx, packet),
                    }
                }
                self.process_actions(to, buffer);
            }
            EventType::TimerExpiry {
                node,
                timer_id,
                generation,
            } => {
                let key = (node, timer_id);
                if self.timer_generations.get(&key) != Some(&generation) {
                    debug!("Skipping cancelled timer event for timer_id={}", timer_id);
                    return true;
                }

                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    match node {
                        NodeId::Sender => self.sender.on_timer(&mut ctx, timer_id),
                        NodeId::Receiver => self.receiver.on_timer(&mut ctx, timer_id),
                    }
                }
                self.process_actions(node, buffer);
            }
            EventType::AppSend { message } => {
                self.app_messages.push(message);
                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    self.sender.on_app_data(&mut ctx, message);
                }
                let refused_before = self.latest_metric(WINDOW_FULL_METRIC);
                self.process_actions(NodeId::Sender, buffer);
                if self.latest_metric(WINDOW_FULL_METRIC) > refused_before {
                    debug!("Sender refused message at {}", self.time);
                } else {
                    self.accepted_messages.push(message);
                }
            }
        }
        true
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            app_messages: self.app_messages.clone(),
            accepted_messages: self.accepted_messages.clone(),
            delivered_data: self.delivered_data.clone(),
            sender_packet_count: self.sender_packet_count,
            receiver_packet_count: self.receiver_packet_count,
            metrics: self.metrics.clone(),
            final_metrics: self.final_metrics(),
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    fn process_actions(&mut self, source_node: NodeId, buffer: ActionBuffer) {
        // First, fold metrics into simulator-wide store
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            info!("[{:?}] {}", source_node, log);
        }

        for data in buffer.delivered_data {
            info!("[{:?}] DELIVERED DATA: {} bytes", source_node, data.len());
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}] DELIVERED {} bytes to application",
                    source_node,
                    data.len()
                ),
            });
            self.delivered_data.push(data);
        }

        for command in buffer.timers {
            match command {
                TimerCommand::Cancel { timer_id } => {
                    // Bumping the generation invalidates every pending expiry of this id
                    *self
                        .timer_generations
                        .entry((source_node, timer_id))
                        .or_insert(0) += 1;
                }
                TimerCommand::Start { delay, timer_id } => {
                    let generation = *self
                        .timer_generations
                        .entry((source_node, timer_id))
                        .or_insert(0);
                    self.push_event(
                        self.time + delay,
                        EventType::TimerExpiry {
                            node: source_node,
                            timer_id,
                            generation,
                        },
                    );
                }
            }
        }

        for packet in buffer.outgoing_packets {
            self.transmit(source_node, packet);
        }
    }

    /// Push one packet through the channel: injected faults, random loss,
    /// random corruption, random latency.
    fn transmit(&mut self, source_node: NodeId, mut packet: Packet) {
        match source_node {
            NodeId::Sender => self.sender_packet_count += 1,
            NodeId::Receiver => self.receiver_packet_count += 1,
        }

        if source_node == NodeId::Sender {
            if let Some(pos) = self
                .drop_sender_seq_once
                .iter()
                .position(|s| *s == packet.seqnum)
            {
                self.drop_sender_seq_once.remove(pos);
                self.record_link_event(format!(
                    "[Sender->Receiver] DROP (deterministic seq) seq={}",
                    packet.seqnum
                ));
                debug!(
                    "Deterministically dropping sender packet with seq={}",
                    packet.seqnum
                );
                return;
            }

            if let Some(pos) = self
                .corrupt_sender_seq_once
                .iter()
                .position(|s| *s == packet.seqnum)
            {
                self.corrupt_sender_seq_once.remove(pos);
                self.record_link_event(format!(
                    "[Sender->Receiver] CORRUPT (deterministic seq) seq={}",
                    packet.seqnum
                ));
                packet.payload[0] ^= 0xFF;
            }
        }

        if source_node == NodeId::Receiver
            && packet.is_ack()
            && let Some(pos) = self
                .drop_receiver_ack_once
                .iter()
                .position(|a| *a == packet.acknum)
        {
            self.drop_receiver_ack_once.remove(pos);
            self.record_link_event(format!(
                "[Receiver->Sender] DROP (deterministic ack) ack={}",
                packet.acknum
            ));
            debug!(
                "Deterministically dropping receiver ACK with ack={}",
                packet.acknum
            );
            return;
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.record_link_event(format!(
                "[{:?}->{:?}] DROP (random loss) seq={} ack={}",
                source_node,
                source_node.peer(),
                packet.seqnum,
                packet.acknum
            ));
            debug!("Packet lost in channel");
            return;
        }

        // 2. Check Corruption
        if self.rng.random::<f64>() < self.config.corrupt_rate {
            self.record_link_event(format!(
                "[{:?}->{:?}] CORRUPT seq={} ack={}",
                source_node,
                source_node.peer(),
                packet.seqnum,
                packet.acknum
            ));
            debug!("Packet corrupted in channel");
            self.corrupt(&mut packet);
        }

        // 3. Calculate Latency
        let latency = self
            .rng
            .random_range(self.config.min_latency..=self.config.max_latency);
        let arrival_time = self.time + latency;

        // 4. Target Node
        let target_node = source_node.peer();

        self.record_link_event(format!(
            "[{:?}->{:?}] SEND seq={} ack={} (latency={})",
            source_node, target_node, packet.seqnum, packet.acknum, latency
        ));

        self.push_event(
            arrival_time,
            EventType::PacketArrival {
                to: target_node,
                packet,
            },
        );
    }

    /// Mangle one of payload / seqnum / acknum. The checksum is left alone so
    /// the receiving role has to notice the mismatch itself.
    fn corrupt(&mut self, packet: &mut Packet) {
        match self.rng.random_range(0..4) {
            0 | 1 => {
                let idx = self.rng.random_range(0..packet.payload.len());
                packet.payload[idx] ^= 0xFF;
            }
            2 => packet.seqnum = MANGLED_FIELD,
            _ => packet.acknum = MANGLED_FIELD,
        }
    }

    fn record_link_event(&mut self, description: String) {
        self.link_events.push(LinkEventSummary {
            time: self.time,
            description,
        });
    }
}
