use s13_core::{PosePacket, S13Error};
use s13_ring::{status, MotionRing, RingConsumer, RingProducer, RING_BYTES, RING_SLOTS};

fn packet(seq: u32) -> PosePacket {
    let mut pkt = PosePacket::new(seq);
    pkt.t_ms = seq * 10;
    pkt.finalize();
    pkt
}

#[test]
fn layout_is_528_bytes() {
    assert_eq!(std::mem::size_of::<MotionRing>(), RING_BYTES);
    assert_eq!(RING_BYTES, 528);
}

#[test]
fn push_then_drain_in_order() {
    let ring = MotionRing::new();
    let mut producer = RingProducer::attach(&ring);
    let mut consumer = RingConsumer::attach(&ring);

    for seq in 1..=5 {
        producer.try_push(&packet(seq)).unwrap();
    }
    assert_eq!(ring.available(), 5);

    let mut seen = Vec::new();
    let n = consumer.drain(|bytes| {
        seen.push(PosePacket::decode(bytes).unwrap().seq);
    });
    assert_eq!(n, 5);
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    assert!(ring.is_empty());
}

#[test]
fn ninth_push_reports_full_and_sets_overflow() {
    let ring = MotionRing::new();
    let mut producer = RingProducer::attach(&ring);

    for seq in 1..=RING_SLOTS as u32 {
        producer.try_push(&packet(seq)).unwrap();
    }
    assert!(ring.is_full());
    assert!(!producer.overflowed());

    assert_eq!(producer.try_push(&packet(99)), Err(S13Error::RingFull));
    assert!(producer.overflowed());

    // OVERFLOW is sticky: draining does not clear it, the producer does.
    let mut consumer = RingConsumer::attach(&ring);
    consumer.drain(|_| {});
    assert!(producer.overflowed());
    producer.clear_overflow();
    assert!(!producer.overflowed());

    // And the freed slots accept new packets.
    producer.try_push(&packet(100)).unwrap();
}

#[test]
fn drain_is_idempotent_after_spurious_wakeup() {
    let ring = MotionRing::new();
    let mut producer = RingProducer::attach(&ring);
    let mut consumer = RingConsumer::attach(&ring);

    producer.try_push(&packet(1)).unwrap();
    assert_eq!(consumer.drain(|_| {}), 1);
    // A duplicated doorbell just finds nothing to do.
    assert_eq!(consumer.drain(|_| panic!("no slot should be delivered")), 0);
}

#[test]
fn indices_are_monotonic_across_wrap() {
    let ring = MotionRing::new();
    let mut producer = RingProducer::attach(&ring);
    let mut consumer = RingConsumer::attach(&ring);

    // Three laps around the 8-slot ring.
    let mut next_expected = 1;
    for lap in 0..3u32 {
        for i in 0..RING_SLOTS as u32 {
            let seq = 1 + lap * RING_SLOTS as u32 + i;
            producer.try_push(&packet(seq)).unwrap();
        }
        consumer.drain(|bytes| {
            let pkt = PosePacket::decode(bytes).unwrap();
            assert_eq!(pkt.seq, next_expected);
            next_expected += 1;
        });
    }
    assert_eq!(ring.write_idx(), 24);
    assert_eq!(ring.read_idx(), 24);
}

#[test]
fn ready_bits_are_partitioned() {
    let ring = MotionRing::new();
    let producer = RingProducer::attach(&ring);
    assert_eq!(ring.status() & status::BRAIN_READY, status::BRAIN_READY);
    assert_eq!(ring.status() & status::MUSCLE_READY, 0);

    let mut consumer = RingConsumer::attach(&ring);
    assert!(producer.muscle_ready());
    assert!(consumer.brain_ready());

    consumer.set_estop(true);
    assert_ne!(ring.status() & status::ESTOP, 0);
    consumer.set_estop(false);
    assert_eq!(ring.status() & status::ESTOP, 0);

    producer.detach();
    assert_eq!(ring.status() & status::BRAIN_READY, 0);
}

#[test]
fn slot_bytes_survive_transit_exactly() {
    let ring = MotionRing::new();
    let mut producer = RingProducer::attach(&ring);
    let mut consumer = RingConsumer::attach(&ring);

    let mut pkt = PosePacket::new(7);
    pkt.servo_us = [
        500, 777, 1000, 1234, 1500, 1776, 2000, 2222, 2400, 2500, 555, 666, 888,
    ];
    pkt.t_ms = 1234;
    pkt.finalize();
    producer.try_push(&pkt).unwrap();

    let mut got = None;
    consumer.drain(|bytes| got = Some(PosePacket::decode(bytes).unwrap()));
    assert_eq!(got, Some(pkt));
}
