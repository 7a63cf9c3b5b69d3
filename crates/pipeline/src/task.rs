//! Per-session pipeline task
//!
//! Owns a running processor chain plus the two workers at its edges: the
//! feeder turns recognized utterances into `TranscriptText` frames, and the
//! sink writes synthesized audio to the transport. Cancelling the task stops
//! all of them promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use receptionist_core::{
    AudioPacket, AudioSink, Error, Frame, ProcessorContext, Result, SpeechToText,
};

use crate::processors::chain::{cancelled, ChainControl, ChainHandle};
use crate::ProcessorChain;

/// Transcripts buffered between the recognizer and the chain input
const TRANSCRIPT_CHANNEL_CAPACITY: usize = 16;

/// Callback invoked for every frame leaving the chain
pub type FrameObserver = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Edges of a session pipeline
pub struct PipelineIo {
    /// Speech recognizer fed with inbound audio
    pub stt: Arc<dyn SpeechToText>,
    /// Inbound audio from the transport
    pub audio_in: mpsc::Receiver<AudioPacket>,
    /// Outbound audio to the transport
    pub audio_out: Arc<dyn AudioSink>,
    /// Optional observer of output frames
    pub observer: Option<FrameObserver>,
}

/// A running session pipeline
pub struct PipelineTask {
    session_id: String,
    input: mpsc::Sender<Frame>,
    control: ChainControl,
    workers: Vec<JoinHandle<()>>,
    conversation_started: Arc<AtomicBool>,
}

/// Queues the greeting turn without borrowing the task
///
/// Cheap to clone, so a caller can drop whatever lock guards the task
/// before waiting on a full pipeline input.
#[derive(Clone)]
pub struct ConversationStarter {
    input: mpsc::Sender<Frame>,
    started: Arc<AtomicBool>,
    cancelled: watch::Receiver<bool>,
}

impl ConversationStarter {
    /// Only the first call across all clones has any effect
    pub async fn start(&self) -> Result<bool> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        if *self.cancelled.borrow() {
            return Err(Error::Cancelled);
        }
        self.input
            .send(Frame::StartConversation)
            .await
            .map_err(|_| Error::ChannelClosed("pipeline input"))?;
        Ok(true)
    }
}

impl PipelineTask {
    /// Start the chain and its edge workers
    pub fn spawn(chain: &ProcessorChain, session_id: impl Into<String>, io: PipelineIo) -> Self {
        let session_id = session_id.into();
        let ChainHandle {
            input,
            output,
            control,
        } = chain.run(ProcessorContext::new(session_id.clone()));

        let PipelineIo {
            stt,
            audio_in,
            audio_out,
            observer,
        } = io;

        let feeder = tokio::spawn(run_feeder(
            session_id.clone(),
            stt,
            audio_in,
            input.clone(),
            control.subscribe(),
        ));
        let sink = tokio::spawn(run_sink(
            session_id.clone(),
            output,
            audio_out,
            observer,
            control.subscribe(),
        ));

        tracing::info!(
            session_id = %session_id,
            stages = ?chain.stage_names(),
            "Pipeline started"
        );

        Self {
            session_id,
            input,
            control,
            workers: vec![feeder, sink],
            conversation_started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Session this pipeline belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue a frame at the head of the chain
    pub async fn queue_frame(&self, frame: Frame) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.input
            .send(frame)
            .await
            .map_err(|_| Error::ChannelClosed("pipeline input"))
    }

    /// Queue the greeting turn; only the first call has any effect
    pub async fn start_conversation(&self) -> Result<bool> {
        self.conversation_starter().start().await
    }

    /// Detached handle for queueing the greeting
    pub fn conversation_starter(&self) -> ConversationStarter {
        ConversationStarter {
            input: self.input.clone(),
            started: Arc::clone(&self.conversation_started),
            cancelled: self.control.subscribe(),
        }
    }

    /// Stop every stage and edge worker
    pub fn cancel(&self) {
        if !self.control.is_cancelled() {
            tracing::info!(session_id = %self.session_id, "Cancelling pipeline");
        }
        self.control.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Wait for all tasks to finish
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::warn!(session_id = %self.session_id, error = %e, "Pipeline worker panicked");
            }
        }
        self.control.join().await;
    }
}

async fn run_feeder(
    session_id: String,
    stt: Arc<dyn SpeechToText>,
    audio_in: mpsc::Receiver<AudioPacket>,
    input: mpsc::Sender<Frame>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let (tx, mut rx) = mpsc::channel::<String>(TRANSCRIPT_CHANNEL_CAPACITY);

    let recognize = stt.transcribe_stream(&session_id, audio_in, tx);
    let forward = async {
        while let Some(text) = rx.recv().await {
            if input.send(Frame::TranscriptText { text }).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => {
            tracing::debug!(session_id = %session_id, "Feeder cancelled");
            return;
        }
        (result, ()) = futures::future::join(recognize, forward) => {
            if let Err(e) = result {
                tracing::warn!(session_id = %session_id, stt = stt.model_name(), error = %e, "Recognition ended with error");
            }
        }
    }

    // inbound audio is gone; drain the chain
    let _ = input.send(Frame::EndOfStream).await;
}

async fn run_sink(
    session_id: String,
    mut output: mpsc::Receiver<Frame>,
    audio_out: Arc<dyn AudioSink>,
    observer: Option<FrameObserver>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => break,
            frame = output.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if let Some(observer) = &observer {
            observer(&frame);
        }

        match frame {
            Frame::AudioOutput {
                packets,
                sentence_index,
            } => {
                for packet in &packets {
                    if *cancel_rx.borrow() {
                        break;
                    }
                    if let Err(e) = audio_out.write(packet).await {
                        tracing::warn!(
                            session_id = %session_id,
                            sentence_index,
                            error = %e,
                            "Audio write failed"
                        );
                        break;
                    }
                }
            }
            Frame::Error {
                stage,
                message,
                recoverable,
            } => {
                tracing::warn!(
                    session_id = %session_id,
                    stage = %stage,
                    recoverable,
                    "Pipeline error: {}",
                    message
                );
            }
            Frame::ToolCallResult { id, payload } => {
                tracing::debug!(session_id = %session_id, tool_call_id = %id, payload = %payload, "Tool result");
            }
            Frame::EndOfStream => break,
            _ => {}
        }
    }

    tracing::debug!(session_id = %session_id, "Sink exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::TranscriptStage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use receptionist_core::FrameProcessor;
    use std::time::Duration;

    /// Emits each configured transcript, then waits for audio to close
    struct ScriptedStt(Vec<&'static str>);

    #[async_trait]
    impl SpeechToText for ScriptedStt {
        async fn transcribe_stream(
            &self,
            _session_id: &str,
            mut audio: mpsc::Receiver<AudioPacket>,
            transcripts: mpsc::Sender<String>,
        ) -> Result<()> {
            for text in &self.0 {
                let _ = transcripts.send(text.to_string()).await;
            }
            while audio.recv().await.is_some() {}
            Ok(())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Answers every request with one sentence of audio
    struct Speak;

    #[async_trait]
    impl FrameProcessor for Speak {
        async fn process(&self, frame: Frame, _ctx: &mut ProcessorContext) -> Result<Vec<Frame>> {
            match frame {
                Frame::ModelRequest { text } | Frame::Sentence { text, .. } => {
                    Ok(vec![Frame::AudioOutput {
                        packets: vec![AudioPacket::new(text.into_bytes(), 20, 0)],
                        sentence_index: 0,
                    }])
                }
                Frame::StartConversation => Ok(vec![Frame::AudioOutput {
                    packets: vec![AudioPacket::new(b"greeting".to_vec(), 20, 0)],
                    sentence_index: 0,
                }]),
                other => Ok(vec![other]),
            }
        }

        fn name(&self) -> &'static str {
            "speak"
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<Vec<u8>>>);

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn write(&self, packet: &AudioPacket) -> Result<()> {
            self.0.lock().push(packet.data.to_vec());
            Ok(())
        }
    }

    impl RecordingSink {
        fn written(&self) -> Vec<Vec<u8>> {
            self.0.lock().clone()
        }
    }

    fn chain() -> ProcessorChain {
        ProcessorChain::builder("test")
            .processor(TranscriptStage::new())
            .processor(Speak)
            .build()
    }

    async fn wait_for(sink: &RecordingSink, count: usize) {
        for _ in 0..100 {
            if sink.written().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_transcript_reaches_sink() {
        let sink = Arc::new(RecordingSink::default());
        let (_audio_tx, audio_rx) = mpsc::channel(4);
        let task = PipelineTask::spawn(
            &chain(),
            "s1",
            PipelineIo {
                stt: Arc::new(ScriptedStt(vec!["hello"])),
                audio_in: audio_rx,
                audio_out: sink.clone(),
                observer: None,
            },
        );

        wait_for(&sink, 1).await;

        assert_eq!(sink.written(), vec![b"hello".to_vec()]);
        task.cancel();
    }

    #[tokio::test]
    async fn test_start_conversation_once() {
        let sink = Arc::new(RecordingSink::default());
        let (_audio_tx, audio_rx) = mpsc::channel(4);
        let task = PipelineTask::spawn(
            &chain(),
            "s1",
            PipelineIo {
                stt: Arc::new(ScriptedStt(vec![])),
                audio_in: audio_rx,
                audio_out: sink.clone(),
                observer: None,
            },
        );

        assert!(task.start_conversation().await.unwrap());
        assert!(!task.start_conversation().await.unwrap());
        wait_for(&sink, 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(sink.written(), vec![b"greeting".to_vec()]);
        task.cancel();
    }

    #[tokio::test]
    async fn test_conversation_starter_shares_once_flag() {
        let sink = Arc::new(RecordingSink::default());
        let (_audio_tx, audio_rx) = mpsc::channel(4);
        let task = PipelineTask::spawn(
            &chain(),
            "s1",
            PipelineIo {
                stt: Arc::new(ScriptedStt(vec![])),
                audio_in: audio_rx,
                audio_out: sink.clone(),
                observer: None,
            },
        );
        let starter = task.conversation_starter();

        let greeted = tokio::spawn({
            let starter = starter.clone();
            async move { starter.start().await }
        });
        assert!(greeted.await.unwrap().unwrap());
        assert!(!starter.start().await.unwrap());
        assert!(!task.start_conversation().await.unwrap());
        wait_for(&sink, 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(sink.written(), vec![b"greeting".to_vec()]);
        task.cancel();
    }

    #[tokio::test]
    async fn test_conversation_starter_after_cancel() {
        let (_audio_tx, audio_rx) = mpsc::channel(4);
        let task = PipelineTask::spawn(
            &chain(),
            "s1",
            PipelineIo {
                stt: Arc::new(ScriptedStt(vec![])),
                audio_in: audio_rx,
                audio_out: Arc::new(RecordingSink::default()),
                observer: None,
            },
        );
        let starter = task.conversation_starter();

        task.cancel();

        assert!(matches!(starter.start().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_stops_everything() {
        let sink = Arc::new(RecordingSink::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer_seen = Arc::clone(&seen);
        let (_audio_tx, audio_rx) = mpsc::channel(4);
        let task = PipelineTask::spawn(
            &chain(),
            "s1",
            PipelineIo {
                stt: Arc::new(ScriptedStt(vec![])),
                audio_in: audio_rx,
                audio_out: sink.clone(),
                observer: Some(Arc::new(move |f: &Frame| {
                    observer_seen.lock().push(f.stage_name());
                })),
            },
        );

        task.cancel();
        assert!(task.is_cancelled());
        assert!(matches!(
            task.queue_frame(Frame::StartConversation).await,
            Err(Error::Cancelled)
        ));

        tokio::time::timeout(Duration::from_secs(1), task.join())
            .await
            .unwrap();
        assert!(sink.written().is_empty());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_audio_close_drains_pipeline() {
        let sink = Arc::new(RecordingSink::default());
        let (audio_tx, audio_rx) = mpsc::channel(4);
        let task = PipelineTask::spawn(
            &chain(),
            "s1",
            PipelineIo {
                stt: Arc::new(ScriptedStt(vec!["bye"])),
                audio_in: audio_rx,
                audio_out: sink.clone(),
                observer: None,
            },
        );

        drop(audio_tx);

        tokio::time::timeout(Duration::from_secs(1), task.join())
            .await
            .unwrap();
        assert_eq!(sink.written(), vec![b"bye".to_vec()]);
    }
}
