//! Channel-based processor chain
//!
//! Connects multiple FrameProcessors with tokio channels. Each processor
//! runs in its own task and handles one frame at a time, so frames of one
//! session keep their arrival order while slow stages never block other
//! sessions.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use receptionist_core::{Frame, FrameProcessor, ProcessorContext, Result};

/// Channel capacity for inter-processor communication
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A chain of frame processors connected by channels
pub struct ProcessorChain {
    /// Name of this chain
    name: String,
    /// Processors in order
    processors: Vec<Arc<dyn FrameProcessor>>,
    /// Channel capacity
    channel_capacity: usize,
}

impl ProcessorChain {
    /// Create a new processor chain
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processors: Vec::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Create using the builder
    pub fn builder(name: impl Into<String>) -> ProcessorChainBuilder {
        ProcessorChainBuilder::new(name)
    }

    /// Add a processor to the chain
    pub fn add<P: FrameProcessor + 'static>(&mut self, processor: P) -> &mut Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Add a shared processor to the chain
    pub fn add_shared(&mut self, processor: Arc<dyn FrameProcessor>) -> &mut Self {
        self.processors.push(processor);
        self
    }

    /// Get the chain name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get number of processors
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Check if chain is empty
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Stage names in order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Process a single frame through the chain without spawning tasks
    ///
    /// Frames a stage pushes while processing are placed before the frames
    /// it returns. The context must not have an emitter attached.
    pub async fn process_one(
        &self,
        frame: Frame,
        context: &mut ProcessorContext,
    ) -> Result<Vec<Frame>> {
        let mut frames = vec![frame];

        for processor in &self.processors {
            let mut next_frames = Vec::new();

            for f in frames {
                let output = processor.process(f, context).await?;
                next_frames.extend(context.take_pending());
                next_frames.extend(output);
            }

            frames = next_frames;
        }

        Ok(frames)
    }

    /// Start the processing pipeline
    ///
    /// Spawns a task for each processor connected by channels. The returned
    /// handle carries the input sender, the output receiver and the control
    /// used to cancel every stage.
    pub fn run(&self, initial_context: ProcessorContext) -> ChainHandle {
        let (input_tx, input_rx) = mpsc::channel::<Frame>(self.channel_capacity);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(self.processors.len().max(1));

        if self.processors.is_empty() {
            // Empty chain: directly connect input to output
            let (output_tx, output_rx) = mpsc::channel::<Frame>(self.channel_capacity);
            let mut input_rx = input_rx;
            let mut cancel_rx = cancel_rx;

            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel_rx) => break,
                        frame = input_rx.recv() => match frame {
                            Some(frame) => {
                                if output_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            }));

            return ChainHandle {
                input: input_tx,
                output: output_rx,
                control: ChainControl { cancel: cancel_tx, tasks },
            };
        }

        let mut current_rx = input_rx;

        for processor in &self.processors {
            let processor = Arc::clone(processor);
            let mut context = initial_context.clone();
            let (next_tx, next_rx) = mpsc::channel::<Frame>(self.channel_capacity);
            context.attach_emitter(next_tx.clone());

            let rx = current_rx;
            let tx = next_tx;
            let cancel_rx = cancel_rx.clone();

            tasks.push(tokio::spawn(run_stage(processor, context, rx, tx, cancel_rx)));

            current_rx = next_rx;
        }

        ChainHandle {
            input: input_tx,
            output: current_rx,
            control: ChainControl { cancel: cancel_tx, tasks },
        }
    }
}

/// Drive one stage until its input closes, end of stream, or cancellation
async fn run_stage(
    processor: Arc<dyn FrameProcessor>,
    mut context: ProcessorContext,
    mut rx: mpsc::Receiver<Frame>,
    tx: mpsc::Sender<Frame>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let processor_name = processor.name();

    if let Err(e) = processor.on_start(&mut context).await {
        tracing::error!(processor = processor_name, error = %e, "Processor on_start failed");
    }

    let mut was_cancelled = false;

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => {
                was_cancelled = true;
                break;
            }
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let is_eos = frame.is_end_of_stream();

        let result = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => {
                was_cancelled = true;
                break;
            }
            result = processor.process(frame, &mut context) => result,
        };

        match result {
            Ok(output_frames) => {
                for output_frame in output_frames {
                    if tx.send(output_frame).await.is_err() {
                        tracing::debug!(processor = processor_name, "Output channel closed");
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::error!(processor = processor_name, error = %e, "Processor error");
                let _ = tx.send(Frame::error(processor_name, &e)).await;
            }
        }

        if is_eos {
            break;
        }
    }

    if was_cancelled {
        tracing::debug!(processor = processor_name, "Processor cancelled");
    }

    if let Err(e) = processor.on_stop(&mut context).await {
        tracing::error!(processor = processor_name, error = %e, "Processor on_stop failed");
    }

    tracing::debug!(processor = processor_name, "Processor task exiting");
}

/// Resolves once the cancel flag is raised; never resolves if the control is gone
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// A running chain
pub struct ChainHandle {
    /// Feed frames into the first stage
    pub input: mpsc::Sender<Frame>,
    /// Frames leaving the last stage
    pub output: mpsc::Receiver<Frame>,
    /// Cancellation and task handles
    pub control: ChainControl,
}

/// Cancels and joins the stage tasks of a running chain
pub struct ChainControl {
    cancel: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChainControl {
    /// Ask every stage to stop after its current suspension point
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// A receiver that observes the cancel flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Wait for every stage task to exit
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Processor task panicked");
            }
        }
    }
}

/// Builder for ProcessorChain
pub struct ProcessorChainBuilder {
    chain: ProcessorChain,
}

impl ProcessorChainBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            chain: ProcessorChain::new(name),
        }
    }

    /// Add a processor
    pub fn processor<P: FrameProcessor + 'static>(mut self, processor: P) -> Self {
        self.chain.add(processor);
        self
    }

    /// Add a shared processor
    pub fn processor_shared(mut self, processor: Arc<dyn FrameProcessor>) -> Self {
        self.chain.add_shared(processor);
        self
    }

    /// Set channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.chain.channel_capacity = capacity.max(1);
        self
    }

    /// Build the chain
    pub fn build(self) -> ProcessorChain {
        self.chain
    }
}
