//! Integration tests for the terminal adapters through the public API

use assert_matches::assert_matches;
use bufstream_core::{
    message::{AudioAuUnit, MessageCode},
    shared, status_of, write_all, ByteChannel, CallbackChannel, Error, FileMode, MemoryChannel, Message,
    NullChannel, RwFileChannel, TmpFileChannel, WaveChannel, BS_ERROR, BS_IO_ERROR, BS_OK,
};
use tempfile::tempdir;

// ---------------------------------------------------------------------------
// Memory channel
// ---------------------------------------------------------------------------

#[test]
fn test_memory_overflow_scenario() {
    let mut ch = MemoryChannel::with_spillover(16, 64);
    let input: Vec<u8> = (0u8..30).collect();
    for part in input.chunks(10) {
        write_all(&mut ch, part).unwrap();
    }

    assert_eq!(ch.spillover(), &input[..20]);
    assert_eq!(ch.pending(), &input[20..]);

    ch.finish(false).unwrap();
    assert_eq!(ch.spillover(), &input[..]);
    assert!(ch.pending().is_empty());
}

#[test]
fn test_memory_lease_commit_conservation() {
    let mut ch = MemoryChannel::new(32);
    let before = ch.capacity();

    let region = ch.lease(12).unwrap();
    region.copy_from_slice(b"abcdefghijkl");
    assert_eq!(ch.commit(7).unwrap(), 7);

    assert_eq!(ch.pending(), b"abcdefg");
    assert_eq!(ch.capacity(), before - 7);
}

#[test]
fn test_memory_lease_above_chunk_is_unavailable() {
    let mut ch = MemoryChannel::new(8);
    assert_matches!(
        ch.lease(9),
        Err(Error::Unavailable {
            requested: 9,
            available: 8
        })
    );
}

// ---------------------------------------------------------------------------
// File channels
// ---------------------------------------------------------------------------

#[test]
fn test_rw_file_round_trip_across_chunk_boundaries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let input: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

    let mut writer = RwFileChannel::create(&path, 64).unwrap();
    for part in input.chunks(37) {
        write_all(&mut writer, part).unwrap();
    }
    assert_eq!(writer.byte_count().unwrap(), 1000);
    writer.close().unwrap();

    let mut reader = RwFileChannel::open_with_mode(&path, 64, FileMode::Read).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 45];
    loop {
        let n = reader.bulk_read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, input);
}

#[test]
fn test_tmp_file_publishes_only_on_close() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("movie.ts");

    let mut ch = TmpFileChannel::create(&target, 32).unwrap();
    write_all(&mut ch, b"committed bytes").unwrap();
    assert!(!target.exists());
    assert!(ch.temp_path().exists());

    ch.close().unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"committed bytes");
    assert!(!dir.path().join("movie.ts.temp").exists());
}

#[test]
fn test_tmp_file_abort_leaves_existing_target() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("movie.ts");
    std::fs::write(&target, b"previous").unwrap();

    let mut ch = TmpFileChannel::create(&target, 32).unwrap();
    write_all(&mut ch, b"partial").unwrap();
    ch.close_discarding_pending().unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"previous");
    assert!(!dir.path().join("movie.ts.temp").exists());
}

#[test]
fn test_tmp_file_dropped_handle_still_publishes() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("dropped.bin");
    {
        let mut ch = TmpFileChannel::create(&target, 32).unwrap();
        write_all(&mut ch, b"tail").unwrap();
    }
    assert_eq!(std::fs::read(&target).unwrap(), b"tail");
}

#[test]
fn test_wave_header_patched_on_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("enc.wav");
    let mut ch = WaveChannel::with_buffer_size(&path, 256).unwrap();

    let mut unit = b"LPCM\x04\x00\x00\x00".to_vec();
    unit.extend_from_slice(&[0x00, 0x10, 0x00, 0x20]);
    write_all(&mut ch, &unit).unwrap();
    ch.message(0, &mut Message::AudioAu(AudioAuUnit { length: 4, pts: 0 }))
        .unwrap();
    write_all(&mut ch, &[0x00, 0x30, 0x00, 0x40]).unwrap();
    ch.message(0, &mut Message::AudioAu(AudioAuUnit { length: 4, pts: 0 }))
        .unwrap();
    ch.close().unwrap();

    let data = std::fs::read(&path).unwrap();
    assert_eq!(&data[..4], b"RIFF");
    assert_eq!(&data[8..12], b"WAVE");
    assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), 36 + 8);
    assert_eq!(u32::from_le_bytes(data[40..44].try_into().unwrap()), 8);
    assert_eq!(&data[44..], &[0x10, 0x00, 0x20, 0x00, 0x30, 0x00, 0x40, 0x00]);
}

// ---------------------------------------------------------------------------
// Message bus
// ---------------------------------------------------------------------------

#[test]
fn test_auxinfo_answers_queries_in_wire_form() {
    let mut ch = NullChannel::new(64);
    write_all(&mut ch, &[0; 40]).unwrap();

    let mut payload = [0u8; 8];
    ch.auxinfo(0, MessageCode::BYTECOUNT_INFO, &mut payload)
        .unwrap();
    assert_eq!(u64::from_le_bytes(payload), 40);

    let err = ch
        .auxinfo(0, MessageCode::BYTECOUNT_INFO, &mut [0u8; 3])
        .unwrap_err();
    assert_matches!(err, Error::PayloadSize { expected: 8, actual: 3, .. });
}

#[test]
fn test_unanswered_query_is_unhandled() {
    let mut ch = MemoryChannel::new(16);
    let err = ch.file_name().unwrap_err();
    assert_matches!(err, Error::Unhandled(MessageCode::FILENAME_INFO));
}

#[test]
fn test_legacy_status_codes() {
    let mut ch = MemoryChannel::new(8);
    assert_eq!(status_of(&write_all(&mut ch, b"ok")), BS_OK);
    assert_eq!(status_of(&ch.lease(64)), BS_ERROR);
    let short = Error::ShortTransfer {
        requested: 4,
        actual: 2,
    };
    assert_eq!(short.status_code(), BS_IO_ERROR);
}

#[test]
fn test_shared_sidecar_is_usable_through_lock() {
    let sidecar = shared(MemoryChannel::new(32));
    write_all(&mut *sidecar.lock(), b"index").unwrap();
    assert_eq!(sidecar.lock().byte_count().unwrap(), 5);
}

#[test]
fn test_boxed_callback_channel_delivers_units() {
    let units = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&units);
    let mut ch: Box<dyn ByteChannel> = Box::new(CallbackChannel::new(64, 64, move |u: &[u8]| {
        sink.lock().push(u.to_vec())
    }));

    write_all(&mut ch, b"unit").unwrap();
    ch.message(0, &mut Message::AudioAu(AudioAuUnit { length: 4, pts: 0 }))
        .unwrap();
    drop(ch);
    assert_eq!(*units.lock(), vec![b"unit".to_vec()]);
}
