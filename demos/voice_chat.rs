// demos/voice_chat.rs
//
// Microphone-to-speaker voice chat wired through the library. The cpal
// streams are !Send, so each device lives on its own thread and the library
// talks to it through the CaptureSource / OutputSink seams.

use chatonn_live::audio::{
    CAPTURE_CHANNELS, CAPTURE_SAMPLE_RATE_HZ, PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE_HZ,
};
use chatonn_live::{
    AudioBuffer, CaptureSource, LiveError, LiveSessionBuilder, OutputSink, Role, SourceId,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use crossbeam_channel::{Sender, bounded};
use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

struct CpalMicSource {
    stop_tx: Option<Sender<()>>,
}

impl CpalMicSource {
    fn new() -> Self {
        Self { stop_tx: None }
    }
}

impl CaptureSource for CpalMicSource {
    fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, LiveError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LiveError::Permission("no input device available".to_string()))?;
        info!("[Mic] Using input device: {:?}", device.name());

        let config = StreamConfig {
            channels: CAPTURE_CHANNELS,
            sample_rate: SampleRate(CAPTURE_SAMPLE_RATE_HZ),
            buffer_size: cpal::BufferSize::Default,
        };
        let (raw_tx, raw_rx) = mpsc::channel::<Vec<f32>>(32);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        self.stop_tx = Some(stop_tx);

        // The stream is !Send; park it on a dedicated thread until stop.
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        std::thread::spawn(move || {
            let stream = match device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = raw_tx.try_send(data.to_vec());
                },
                |err| error!("[Mic] Stream error: {}", err),
                None,
            ) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
        });

        ready_rx
            .recv()
            .map_err(|_| LiveError::Permission("capture thread died".to_string()))?
            .map_err(LiveError::Permission)?;
        Ok(raw_rx)
    }

    fn close(&mut self) {
        self.stop_tx.take();
    }
}

#[derive(Default)]
struct SpeakerShared {
    // Chunks in scheduled order; the scheduler guarantees contiguity, so
    // draining them back-to-back realizes the schedule.
    queue: VecDeque<(SourceId, Vec<f32>, usize)>,
    samples_played: u64,
    ended: Vec<SourceId>,
}

struct CpalSpeakerSink {
    shared: Arc<Mutex<SpeakerShared>>,
    next_id: SourceId,
    stop_tx: Option<Sender<()>>,
}

impl CpalSpeakerSink {
    fn open() -> Result<Self, LiveError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LiveError::Internal("no output device available".to_string()))?;
        info!("[Speaker] Using output device: {:?}", device.name());

        let config = StreamConfig {
            channels: PLAYBACK_CHANNELS,
            sample_rate: SampleRate(PLAYBACK_SAMPLE_RATE_HZ),
            buffer_size: cpal::BufferSize::Default,
        };
        let shared = Arc::new(Mutex::new(SpeakerShared::default()));
        let shared_cb = shared.clone();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);

        std::thread::spawn(move || {
            let stream = match device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut shared = shared_cb.lock().unwrap();
                    shared.samples_played += data.len() as u64;
                    for slot in data.iter_mut() {
                        *slot = 0.0;
                        while let Some((id, samples, pos)) = shared.queue.front_mut() {
                            if *pos < samples.len() {
                                *slot = samples[*pos];
                                *pos += 1;
                                break;
                            }
                            let finished = *id;
                            shared.queue.pop_front();
                            shared.ended.push(finished);
                        }
                    }
                },
                |err| error!("[Speaker] Stream error: {}", err),
                None,
            ) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
        });

        ready_rx
            .recv()
            .map_err(|_| LiveError::Internal("playback thread died".to_string()))?
            .map_err(LiveError::Internal)?;
        Ok(Self {
            shared,
            next_id: 0,
            stop_tx: Some(stop_tx),
        })
    }
}

impl OutputSink for CpalSpeakerSink {
    fn now(&self) -> f64 {
        let shared = self.shared.lock().unwrap();
        shared.samples_played as f64 / PLAYBACK_SAMPLE_RATE_HZ as f64
    }

    fn start_at(&mut self, chunk: AudioBuffer, _when: f64) -> Result<SourceId, LiveError> {
        let id = self.next_id;
        self.next_id += 1;
        let samples = chunk.channels.into_iter().next().unwrap_or_default();
        self.shared.lock().unwrap().queue.push_back((id, samples, 0));
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) -> Result<(), LiveError> {
        self.shared.lock().unwrap().queue.retain(|(qid, ..)| *qid != id);
        Ok(())
    }

    fn close(&mut self) -> Result<(), LiveError> {
        self.stop_tx.take();
        Ok(())
    }

    fn take_ended(&mut self) -> Vec<SourceId> {
        std::mem::take(&mut self.shared.lock().unwrap().ended)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenv::dotenv().ok();
    let api_key = env::var("GEMINI_API_KEY").map_err(|_| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

    let speaker = CpalSpeakerSink::open()?;
    let (session, mut transcripts) = LiveSessionBuilder::new(api_key)
        .start(CpalMicSource::new(), speaker)
        .await?;
    info!("[Main] Session started. Speak; Ctrl+C to stop.");

    loop {
        tokio::select! {
            entry = transcripts.recv() => match entry {
                Some(entry) => {
                    let who = match entry.role {
                        Role::User => "You",
                        Role::Assistant => "Chatonn",
                    };
                    println!("{}: {}", who, entry.text);
                }
                None => {
                    warn!("[Main] Session ended.");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("[Main] Ctrl+C; stopping session.");
                break;
            }
        }
    }

    session.stop().await;
    Ok(())
}
