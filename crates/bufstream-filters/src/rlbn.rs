//! DVD navigation pack logging.
//!
//! A DVD muxer reports every navigation pack it writes with its relative
//! logical block number (RLBN). [`RlbnFilter`] appends each report to a
//! sidecar as a 16 byte record and answers the last-RLBN and count
//! queries. The main channel can be swapped between titles, so it is
//! optional.

use bufstream_core::message::Record;
use bufstream_core::{ByteChannel, Error, Message, Result, SharedChannel};
use tracing::{debug, warn};

use crate::sidecar_write;

pub struct RlbnFilter<C: ByteChannel> {
    main: Option<C>,
    sidecar: Option<SharedChannel>,
    last_rlbn: u32,
    rlbn_count: u32,
    finished: bool,
}

impl<C: ByteChannel> RlbnFilter<C> {
    pub fn new(main: Option<C>, sidecar: Option<SharedChannel>) -> Self {
        Self {
            main,
            sidecar,
            last_rlbn: 0,
            rlbn_count: 0,
            finished: false,
        }
    }

    /// Replace the main channel and hand back the previous one unfinished.
    pub fn switch_main(&mut self, main: Option<C>) -> Option<C> {
        std::mem::replace(&mut self.main, main)
    }

    pub fn inner(&self) -> Option<&C> {
        self.main.as_ref()
    }

    pub fn last_rlbn(&self) -> u32 {
        self.last_rlbn
    }

    pub fn rlbn_count(&self) -> u32 {
        self.rlbn_count
    }

    fn attached(&mut self) -> Result<&mut C> {
        self.main
            .as_mut()
            .ok_or_else(|| Error::protocol("no main channel attached"))
    }

    /// Forward when a main channel is attached.
    fn forward(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        match self.main.as_mut() {
            Some(main) => main.message(offset, msg),
            None => Ok(()),
        }
    }
}

impl<C: ByteChannel> ByteChannel for RlbnFilter<C> {
    fn capacity(&self) -> usize {
        self.main.as_ref().map_or(0, |m| m.capacity())
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        self.attached()?.lease(n)
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        self.attached()?.commit(n)
    }

    fn bulk_transfer(&mut self, data: &[u8]) -> Result<usize> {
        self.attached()?.bulk_transfer(data)
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.attached()?.bulk_read(buf)
    }

    fn chunk_size(&self) -> usize {
        self.main.as_ref().map_or(0, |m| m.chunk_size())
    }

    fn split(&mut self) -> Result<()> {
        self.attached()?.split()
    }

    fn message(&mut self, offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::DvdRlbnInfo(nav) => {
                if let Some(sidecar) = &self.sidecar {
                    sidecar_write(sidecar, &nav.to_bytes())?;
                }
                self.last_rlbn = nav.nv_sa;
                self.rlbn_count += 1;
                self.forward(offset, msg)
            }
            Message::DvdGetLastRlbn(answer) => {
                *answer = self.last_rlbn;
                // A channel below may track its own RLBNs; otherwise keep ours.
                match self.forward(offset, msg) {
                    Err(Error::Unhandled(_)) => Ok(()),
                    other => other,
                }
            }
            Message::DvdGetRlbnCount(answer) => {
                *answer = self.rlbn_count;
                Ok(())
            }
            other => match self.main.as_mut() {
                Some(main) => main.message(offset, other),
                None => Err(Error::Unhandled(other.code())),
            },
        }
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        debug!(count = self.rlbn_count, last = self.last_rlbn, "RLBN log closed");
        match self.main.as_mut() {
            Some(main) => main.finish(abort),
            None => Ok(()),
        }
    }
}

impl<C: ByteChannel> Drop for RlbnFilter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("RLBN filter teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bufstream_core::message::NavInfo;
    use bufstream_core::testing::RecordingChannel;
    use bufstream_core::{shared, MessageCode, RwFileChannel};

    fn nav(nv_sa: u32) -> Message {
        Message::DvdRlbnInfo(NavInfo {
            nv_sa,
            frame_num: 1,
            vob_num: 1,
            cell_num: 2,
        })
    }

    #[test]
    fn test_records_and_answers_queries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav.rlbn");
        let sidecar = shared(RwFileChannel::create(&path, 64).unwrap());
        let mut filter = RlbnFilter::new(Some(RecordingChannel::new(64)), Some(sidecar.clone()));

        filter.message(0, &mut nav(10)).unwrap();
        filter.message(0, &mut nav(42)).unwrap();

        let mut last = Message::DvdGetLastRlbn(0);
        filter.message(0, &mut last).unwrap();
        assert_eq!(last, Message::DvdGetLastRlbn(42));
        let mut count = Message::DvdGetRlbnCount(0);
        filter.message(0, &mut count).unwrap();
        assert_eq!(count, Message::DvdGetRlbnCount(2));

        filter.finish(false).unwrap();
        sidecar.lock().finish(false).unwrap();
        let log = std::fs::read(&path).unwrap();
        assert_eq!(log.len(), 32);
        assert_eq!(&log[16..20], &42u32.to_le_bytes());

        let forwarded = filter.inner().unwrap().messages();
        assert_eq!(forwarded.len(), 3);
        assert!(forwarded.iter().all(|m| !matches!(m, Message::DvdGetRlbnCount(_))));
    }

    #[test]
    fn test_switch_main_returns_previous_channel() {
        let mut filter = RlbnFilter::new(Some(RecordingChannel::new(64)), None);
        filter.bulk_transfer(b"title one").unwrap();
        let previous = filter.switch_main(Some(RecordingChannel::new(64))).unwrap();
        assert_eq!(previous.data(), b"title one");
        assert!(!previous.finished());
        filter.bulk_transfer(b"two").unwrap();
        assert_eq!(filter.inner().unwrap().data(), b"two");
    }

    #[test]
    fn test_without_main_channel() {
        let mut filter: RlbnFilter<RecordingChannel> = RlbnFilter::new(None, None);
        assert_matches!(filter.bulk_transfer(b"x"), Err(Error::Protocol(_)));
        filter.message(0, &mut nav(3)).unwrap();
        assert_eq!(filter.last_rlbn(), 3);
        assert_matches!(
            filter.message(0, &mut Message::StreamEnd),
            Err(Error::Unhandled(MessageCode::STREAM_END_CODE))
        );
        assert_eq!(filter.chunk_size(), 0);
    }
}
