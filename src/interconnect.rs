use std::collections::VecDeque;

use serde::Serialize;
use tracing::trace;

use crate::clock::{Activity, Clocked, Tick};
use crate::config::InterconnectConfig;
use crate::error::{Result, RnnError};

/// Values sent together, travelling as one unit
#[derive(Debug, Clone, PartialEq)]
struct Packet {
    sent_at: Tick,
    arrival: Tick,
    values: Vec<f64>,
}

/// Traffic counters of an interconnect
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InterconnectStats {
    pub packets_sent: u64,
    pub values_sent: u64,
    pub packets_delivered: u64,
    pub values_delivered: u64,
    /// Sum over delivered packets of delivery tick minus send tick
    pub transit_ticks: u64,
    pub peak_queued: usize,
}

impl InterconnectStats {
    /// Average ticks between send and delivery
    pub fn average_latency(&self) -> f64 {
        if self.packets_delivered == 0 {
            0.0
        } else {
            self.transit_ticks as f64 / self.packets_delivered as f64
        }
    }
}

/// A latency- and bandwidth-limited link between two layers
#[derive(Debug, Clone)]
pub struct Interconnect {
    name: String,
    latency: Tick,
    bandwidth: usize,
    in_flight: VecDeque<Packet>,
    clock: Tick,
    stats: InterconnectStats,
}

impl Interconnect {
    pub fn new(name: impl Into<String>, config: &InterconnectConfig) -> Result<Self> {
        let name = name.into();
        config.validate(&name)?;
        Ok(Interconnect {
            name,
            latency: config.latency,
            bandwidth: config.bandwidth,
            in_flight: VecDeque::new(),
            clock: 0,
            stats: InterconnectStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latency(&self) -> Tick {
        self.latency
    }

    pub fn bandwidth(&self) -> usize {
        self.bandwidth
    }

    pub fn stats(&self) -> InterconnectStats {
        self.stats
    }

    /// Values sent at or before `at` that are still waiting for delivery
    pub fn queued_at(&self, at: Tick) -> usize {
        self.in_flight
            .iter()
            .filter(|p| p.sent_at <= at)
            .map(|p| p.values.len())
            .sum()
    }

    /// Arrival tick of the earliest undelivered packet
    pub fn next_arrival(&self) -> Option<Tick> {
        self.in_flight.iter().map(|p| p.arrival).min()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Queue `values` for delivery `latency` ticks after `at`
    pub fn send(&mut self, values: &[f64], at: Tick) -> Result<()> {
        let queued = self.queued_at(at);
        if queued + values.len() > self.bandwidth {
            return Err(RnnError::BandwidthExceeded {
                link: self.name.clone(),
                at,
                requested: values.len(),
                queued,
                bandwidth: self.bandwidth,
            });
        }

        let arrival = at + self.latency;
        trace!(link = %self.name, at, arrival, count = values.len(), "packet sent");
        self.in_flight.push_back(Packet {
            sent_at: at,
            arrival,
            values: values.to_vec(),
        });

        self.stats.packets_sent += 1;
        self.stats.values_sent += values.len() as u64;
        self.stats.peak_queued = self.stats.peak_queued.max(queued + values.len());
        Ok(())
    }

    /// Take every packet due at or before `at`, in the order they were sent
    pub fn deliver(&mut self, at: Tick) -> Vec<f64> {
        let (due, pending): (VecDeque<Packet>, VecDeque<Packet>) =
            std::mem::take(&mut self.in_flight)
                .into_iter()
                .partition(|p| p.arrival <= at);
        self.in_flight = pending;

        let mut values = Vec::new();
        for packet in due {
            trace!(
                link = %self.name,
                at,
                sent_at = packet.sent_at,
                count = packet.values.len(),
                "packet delivered"
            );
            self.stats.packets_delivered += 1;
            self.stats.values_delivered += packet.values.len() as u64;
            self.stats.transit_ticks += at - packet.sent_at;
            values.extend(packet.values);
        }
        values
    }

    /// Drop everything in flight
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}

impl Clocked for Interconnect {
    /// Busy while a packet is still in transit at `now`
    fn tick(&mut self, now: Tick) -> Result<Activity> {
        self.clock = self.clock.max(now);
        let in_transit = self.in_flight.iter().any(|p| p.arrival > self.clock);
        Ok(if in_transit {
            Activity::Busy
        } else {
            Activity::Idle
        })
    }
}
