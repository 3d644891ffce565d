use s13_core::limits::{CHANNELS, PWM_NEUTRAL_US};
use s13_core::packet::flag;
use s13_core::{PosePacket, S13Error, POSE_PACKET_SIZE};

#[test]
fn neutral_packet_shape() {
    let pkt = PosePacket::new(7);
    assert_eq!(pkt.magic, 0xB31A);
    assert_eq!((pkt.ver_major, pkt.ver_minor), (3, 1));
    assert_eq!(pkt.seq, 7);
    assert_eq!(pkt.t_ms, 0);
    assert_eq!(pkt.flags, flag::CLAMP_ENABLE);
    assert_eq!(pkt.servo_us, [PWM_NEUTRAL_US; CHANNELS]);
}

#[test]
fn encode_decode_roundtrip() {
    let mut pkt = PosePacket::new(42);
    pkt.t_ms = 350;
    pkt.flags = flag::CLAMP_ENABLE | flag::INTERP_Q16;
    for (i, us) in pkt.servo_us.iter_mut().enumerate() {
        *us = 500 + (i as u16) * 150;
    }
    pkt.finalize();

    let wire = pkt.encode();
    assert_eq!(wire.len(), POSE_PACKET_SIZE);
    let back = PosePacket::decode(&wire).expect("valid packet must decode");
    assert_eq!(back, pkt);
}

#[test]
fn wire_layout_is_little_endian() {
    let mut pkt = PosePacket::new(0x0403_0201);
    pkt.t_ms = 0x0807_0605;
    pkt.servo_us[0] = 0x1234;
    pkt.finalize();
    let wire = pkt.encode();

    assert_eq!(&wire[0..2], &[0x1A, 0xB3]);
    assert_eq!(&wire[2..4], &[3, 1]);
    assert_eq!(&wire[4..8], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&wire[8..12], &[0x05, 0x06, 0x07, 0x08]);
    assert_eq!(&wire[14..16], &[0x34, 0x12]);
}

#[test]
fn rejects_bad_magic() {
    let mut pkt = PosePacket::new(1);
    pkt.finalize();
    let mut wire = pkt.encode();
    wire[0] = 0x00;
    assert_eq!(PosePacket::decode(&wire), Err(S13Error::BadMagic));
}

#[test]
fn rejects_bad_version() {
    let mut pkt = PosePacket::new(1);
    pkt.finalize();
    let mut wire = pkt.encode();
    wire[2] = 2;
    // The version field participates in the CRC, but the version check
    // runs first so the error names the actual mismatch.
    assert_eq!(PosePacket::decode(&wire), Err(S13Error::BadVersion));
}

#[test]
fn rejects_truncated_buffer() {
    let mut pkt = PosePacket::new(1);
    pkt.finalize();
    let wire = pkt.encode();
    assert_eq!(
        PosePacket::decode(&wire[..POSE_PACKET_SIZE - 1]),
        Err(S13Error::Truncated)
    );
}

#[test]
fn any_single_bit_flip_fails_crc() {
    let mut pkt = PosePacket::new(99);
    pkt.t_ms = 100;
    pkt.servo_us[5] = 2100;
    pkt.finalize();
    let wire = pkt.encode();

    // Flip every bit of the CRC-covered region (bytes 4..40; the magic and
    // version bytes trip their own checks before the CRC runs).
    for byte in 4..POSE_PACKET_SIZE - 2 {
        for bit in 0..8 {
            let mut bad = wire;
            bad[byte] ^= 1 << bit;
            assert_eq!(
                PosePacket::decode(&bad),
                Err(S13Error::BadCrc),
                "flip at {}:{} slipped through",
                byte,
                bit
            );
        }
    }
}
