//! Background segmentation.
//!
//! One worker thread owns the [`Segmenter`]. Requests carry a generation
//! number; when several are queued only the newest is computed, and replies
//! for anything but the latest request are dropped on the receiving side.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mask::SoftMask;
use crate::segment::{run_segmenter, Segmenter};

struct Job {
    generation: u64,
    key: PathBuf,
    image: RgbImage,
}

/// The outcome of one segmentation request.
#[derive(Debug)]
pub struct SegmentationReply {
    /// Generation returned by [`SegmentationWorker::request`].
    pub generation: u64,
    /// The key the request was made for, usually the source file path.
    pub key: PathBuf,
    /// The soft mask, or why segmentation failed.
    pub result: Result<SoftMask>,
}

/// Runs segmentation off the caller's thread.
pub struct SegmentationWorker {
    jobs: Option<Sender<Job>>,
    replies: Receiver<SegmentationReply>,
    latest: u64,
    handle: Option<JoinHandle<()>>,
}

impl SegmentationWorker {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn spawn(segmenter: Arc<dyn Segmenter>) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (reply_tx, reply_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("segmentation".into())
            .spawn(move || run(&*segmenter, &job_rx, &reply_tx))?;
        Ok(Self {
            jobs: Some(job_tx),
            replies: reply_rx,
            latest: 0,
            handle: Some(handle),
        })
    }

    /// Queue `image` for segmentation and return the request's generation.
    ///
    /// Any earlier request that has not been answered yet becomes stale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelUnavailable`] if the worker thread has stopped.
    pub fn request(&mut self, key: PathBuf, image: RgbImage) -> Result<u64> {
        let generation = self.latest + 1;
        let sender = self.jobs.as_ref().ok_or_else(stopped)?;
        sender
            .send(Job {
                generation,
                key,
                image,
            })
            .map_err(|_| stopped())?;
        self.latest = generation;
        Ok(generation)
    }

    /// Generation of the most recent request (`0` before the first).
    #[must_use]
    pub fn latest_generation(&self) -> u64 {
        self.latest
    }

    /// Non-blocking: the reply to the latest request, if it has arrived.
    pub fn poll(&self) -> Option<SegmentationReply> {
        while let Ok(reply) = self.replies.try_recv() {
            if let Some(reply) = self.accept(reply) {
                return Some(reply);
            }
        }
        None
    }

    /// Block up to `timeout` for the reply to the latest request.
    pub fn wait(&self, timeout: Duration) -> Option<SegmentationReply> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.replies.recv_timeout(remaining) {
                Ok(reply) => {
                    if let Some(reply) = self.accept(reply) {
                        return Some(reply);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn accept(&self, reply: SegmentationReply) -> Option<SegmentationReply> {
        if reply.generation == self.latest {
            Some(reply)
        } else {
            debug!(
                generation = reply.generation,
                latest = self.latest,
                "dropping stale segmentation result"
            );
            None
        }
    }
}

impl Drop for SegmentationWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("segmentation worker panicked");
            }
        }
    }
}

fn stopped() -> Error {
    Error::ModelUnavailable("segmentation worker has stopped".to_string())
}

fn run(segmenter: &dyn Segmenter, jobs: &Receiver<Job>, replies: &Sender<SegmentationReply>) {
    while let Ok(mut job) = jobs.recv() {
        // Skip straight to the newest queued request.
        while let Ok(newer) = jobs.try_recv() {
            debug!(generation = job.generation, "superseded before start");
            job = newer;
        }
        let result = run_segmenter(segmenter, &job.key, &job.image);
        if let Err(e) = &result {
            warn!(key = %job.key.display(), error = %e, "segmentation failed");
        }
        let reply = SegmentationReply {
            generation: job.generation,
            key: job.key,
            result,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn constant(value: f32) -> Arc<dyn Segmenter> {
        Arc::new(move |img: &RgbImage| -> Result<SoftMask> {
            thread::sleep(Duration::from_millis(20));
            Ok(SoftMask::new(ImageBuffer::from_pixel(
                img.width(),
                img.height(),
                Luma([value]),
            )))
        })
    }

    #[test]
    fn reply_carries_mask_for_request() {
        let mut worker = SegmentationWorker::spawn(constant(0.8)).unwrap();
        let generation = worker.request("a.png".into(), RgbImage::new(6, 4)).unwrap();
        let reply = worker.wait(Duration::from_secs(10)).unwrap();
        assert_eq!(reply.generation, generation);
        assert_eq!(reply.key, PathBuf::from("a.png"));
        assert_eq!(reply.result.unwrap().dimensions(), (6, 4));
    }

    #[test]
    fn only_latest_request_is_delivered() {
        let mut worker = SegmentationWorker::spawn(constant(0.5)).unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            worker.request(name.into(), RgbImage::new(3, 3)).unwrap();
        }
        let reply = worker.wait(Duration::from_secs(10)).unwrap();
        assert_eq!(reply.generation, 3);
        assert_eq!(reply.key, PathBuf::from("c.png"));
        assert!(worker.wait(Duration::from_millis(100)).is_none());
    }

    #[test]
    fn segmenter_errors_are_reported() {
        let failing: Arc<dyn Segmenter> = Arc::new(|_: &RgbImage| -> Result<SoftMask> {
            Err(Error::ModelUnavailable("weights missing".into()))
        });
        let mut worker = SegmentationWorker::spawn(failing).unwrap();
        worker.request("x.png".into(), RgbImage::new(2, 2)).unwrap();
        let reply = worker.wait(Duration::from_secs(10)).unwrap();
        assert!(matches!(reply.result, Err(Error::ModelUnavailable(_))));
    }

    #[test]
    fn drop_stops_worker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let seg: Arc<dyn Segmenter> = Arc::new(move |img: &RgbImage| -> Result<SoftMask> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(SoftMask::new(ImageBuffer::new(img.width(), img.height())))
        });
        let mut worker = SegmentationWorker::spawn(seg).unwrap();
        worker.request("x.png".into(), RgbImage::new(2, 2)).unwrap();
        worker.wait(Duration::from_secs(10)).unwrap();
        drop(worker);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
