//! Multi-instance publish/subscribe topics.
//!
//! Every publisher advertises itself on a topic and gets the lowest free
//! instance number. Subscribers receive the reports of all instances through a
//! bounded channel; a full channel drops the report.

use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use px4flow::{DistanceReport, OpticalFlowReport, TelemetrySink};
use tracing::{debug, warn};

pub const MAX_INSTANCES: usize = 4;
const QUEUE_DEPTH: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample<T> {
    pub instance: u8,
    pub report: T,
}

struct TopicInner<T> {
    advertised: [bool; MAX_INSTANCES],
    subscribers: Vec<Sender<Sample<T>>>,
}

pub struct Topic<T> {
    name: &'static str,
    inner: Arc<Mutex<TopicInner<T>>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Topic<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(TopicInner {
                advertised: [false; MAX_INSTANCES],
                subscribers: vec![],
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Claims the lowest free instance, or `None` if all are taken.
    pub fn advertise(&self) -> Option<Publication<T>> {
        let mut inner = self.inner.lock();
        let index = inner.advertised.iter().position(|taken| !taken)?;
        inner.advertised[index] = true;
        debug!("{}: advertised instance {index}", self.name);
        Some(Publication {
            topic: self.clone(),
            instance: index as u8,
        })
    }

    pub fn subscribe(&self) -> Receiver<Sample<T>> {
        let (tx, rx) = bounded(QUEUE_DEPTH);
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Number of advertised instances.
    pub fn instances(&self) -> usize {
        self.inner.lock().advertised.iter().filter(|x| **x).count()
    }
}

/// An advertised instance of a topic. Dropping it frees the instance.
pub struct Publication<T> {
    topic: Topic<T>,
    instance: u8,
}

impl<T: Clone> Publication<T> {
    pub fn instance(&self) -> u8 {
        self.instance
    }

    pub fn publish(&self, report: T) {
        let instance = self.instance;
        self.topic.inner.lock().subscribers.retain(|tx| {
            match tx.try_send(Sample {
                instance,
                report: report.clone(),
            }) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}

impl<T> Drop for Publication<T> {
    fn drop(&mut self) {
        self.topic.inner.lock().advertised[usize::from(self.instance)] = false;
    }
}

#[derive(Clone)]
pub struct Telemetry {
    pub optical_flow: Topic<OpticalFlowReport>,
    pub distance: Topic<DistanceReport>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            optical_flow: Topic::new("sensor_optical_flow"),
            distance: Topic::new("distance_sensor"),
        }
    }
}

/// Publishes the reports of one device. Publications are advertised on first use.
pub struct TopicSink {
    telemetry: Telemetry,
    flow: Option<Publication<OpticalFlowReport>>,
    distance: Option<Publication<DistanceReport>>,
    last_flow: Option<OpticalFlowReport>,
    last_distance: Option<DistanceReport>,
    warned: bool,
}

impl TopicSink {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            telemetry,
            flow: None,
            distance: None,
            last_flow: None,
            last_distance: None,
            warned: false,
        }
    }

    pub fn last_flow(&self) -> Option<&OpticalFlowReport> {
        self.last_flow.as_ref()
    }

    pub fn last_distance(&self) -> Option<&DistanceReport> {
        self.last_distance.as_ref()
    }

    fn warn_once(&mut self, topic: &str) {
        if !self.warned {
            warn!("{topic}: no free instance");
            self.warned = true;
        }
    }
}

impl TelemetrySink for TopicSink {
    fn publish_flow(&mut self, report: &OpticalFlowReport) {
        if self.flow.is_none() {
            self.flow = self.telemetry.optical_flow.advertise();
        }
        self.last_flow = Some(*report);
        match &self.flow {
            Some(publication) => publication.publish(*report),
            None => self.warn_once(self.telemetry.optical_flow.name()),
        }
    }

    fn publish_distance(&mut self, report: &DistanceReport) {
        self.last_distance = Some(*report);
        if let Some(publication) = &self.distance {
            publication.publish(*report);
        }
    }

    fn distance_instance(&mut self) -> Option<u8> {
        if self.distance.is_none() {
            self.distance = self.telemetry.distance.advertise();
            if self.distance.is_none() {
                self.warn_once(self.telemetry.distance.name());
            }
        }
        self.distance.as_ref().map(Publication::instance)
    }
}

#[cfg(test)]
mod tests {
    use px4flow::{DeviceId, DistanceSensorType, Rotation, SIGNAL_QUALITY_INVALID};

    use super::*;

    fn distance(current_distance: f32) -> DistanceReport {
        DistanceReport {
            timestamp_us: 0,
            device_id: DeviceId::px4flow(1, 0x42),
            min_distance: 0.3,
            max_distance: 5.0,
            current_distance,
            variance: 0.0,
            signal_quality: SIGNAL_QUALITY_INVALID,
            sensor_type: DistanceSensorType::Ultrasound,
            orientation: Rotation::DOWNWARD_FACING,
        }
    }

    #[test]
    fn lowest_free_instance() {
        let topic = Topic::<u32>::new("test");
        let a = topic.advertise().unwrap();
        let b = topic.advertise().unwrap();
        assert_eq!((a.instance(), b.instance()), (0, 1));
        drop(a);
        assert_eq!(topic.instances(), 1);
        let c = topic.advertise().unwrap();
        assert_eq!(c.instance(), 0);
    }

    #[test]
    fn instances_run_out() {
        let topic = Topic::<u32>::new("test");
        let held: Vec<_> = (0..MAX_INSTANCES).map(|_| topic.advertise().unwrap()).collect();
        assert!(topic.advertise().is_none());
        drop(held);
        assert_eq!(topic.instances(), 0);
    }

    #[test]
    fn full_subscriber_drops_reports() {
        let topic = Topic::<u32>::new("test");
        let rx = topic.subscribe();
        let publication = topic.advertise().unwrap();
        for i in 0..QUEUE_DEPTH as u32 + 4 {
            publication.publish(i);
        }
        let received: Vec<_> = rx.try_iter().map(|s| s.report).collect();
        assert_eq!(received.len(), QUEUE_DEPTH);
        assert_eq!(received[0], 0);
    }

    #[test]
    fn disconnected_subscribers_are_removed() {
        let topic = Topic::<u32>::new("test");
        drop(topic.subscribe());
        let publication = topic.advertise().unwrap();
        publication.publish(1);
        assert!(topic.inner.lock().subscribers.is_empty());
    }

    #[test]
    fn only_first_sink_gets_distance_instance_zero() {
        let telemetry = Telemetry::default();
        let rx = telemetry.distance.subscribe();
        let mut first = TopicSink::new(telemetry.clone());
        let mut second = TopicSink::new(telemetry.clone());

        assert_eq!(first.distance_instance(), Some(0));
        assert_eq!(second.distance_instance(), Some(1));
        assert_eq!(first.distance_instance(), Some(0));

        first.publish_distance(&distance(1.5));
        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.instance, 0);
        assert_eq!(sample.report.current_distance, 1.5);
        assert_eq!(first.last_distance().unwrap().current_distance, 1.5);

        drop(first);
        let mut third = TopicSink::new(telemetry);
        assert_eq!(third.distance_instance(), Some(0));
    }
}
