//! Run radio work on a dedicated blocking thread
//!
//! Bit-banging blocks for the whole press, so the controller lives on one
//! blocking worker and every command, status poll and all-off request is
//! queued to it. Jobs run one at a time in arrival order, which keeps polls
//! from ever overlapping a send.
use ::tokio::{
    sync::{mpsc, oneshot},
    task::{self, JoinHandle},
};
use tracing::debug;

use crate::{
    controller::{Controller, HostCommand, NodeStatus, Target},
    error::{Error, Result},
};

const QUEUE_DEPTH: usize = 32;

enum Job {
    Dispatch {
        address: String,
        command: HostCommand,
        reply: oneshot::Sender<Result<NodeStatus>>,
    },
    Execute {
        target: Target,
        command: HostCommand,
        reply: oneshot::Sender<Result<Vec<NodeStatus>>>,
    },
    Query {
        reply: oneshot::Sender<Vec<NodeStatus>>,
    },
    AllOff {
        reply: oneshot::Sender<Vec<(String, Result<()>)>>,
    },
}

fn stopped() -> Error {
    Error::Other(String::from("transmit worker stopped"))
}

/// Handle to the transmit worker. Cheap to clone; the worker exits once
/// every handle is dropped.
#[derive(Clone)]
pub struct Worker {
    jobs: mpsc::Sender<Job>,
}

impl Worker {
    pub fn spawn(mut controller: Controller) -> (Worker, JoinHandle<()>) {
        let (jobs, mut queue) = mpsc::channel(QUEUE_DEPTH);
        let handle = task::spawn_blocking(move || {
            while let Some(job) = queue.blocking_recv() {
                match job {
                    Job::Dispatch {
                        address,
                        command,
                        reply,
                    } => {
                        let _ = reply.send(controller.dispatch(&address, command));
                    }
                    Job::Execute {
                        target,
                        command,
                        reply,
                    } => {
                        let _ = reply.send(controller.execute(&target, command));
                    }
                    Job::Query { reply } => {
                        let _ = reply.send(controller.query());
                    }
                    Job::AllOff { reply } => {
                        let _ = reply.send(controller.all_off());
                    }
                }
            }
            debug!("transmit worker stopped");
        });
        (Worker { jobs }, handle)
    }

    async fn submit<T>(&self, job: Job, response: oneshot::Receiver<T>) -> Result<T> {
        self.jobs.send(job).await.map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }

    pub async fn dispatch(&self, address: &str, command: HostCommand) -> Result<NodeStatus> {
        let (reply, response) = oneshot::channel();
        let job = Job::Dispatch {
            address: address.to_owned(),
            command,
            reply,
        };
        self.submit(job, response).await?
    }

    pub async fn execute(&self, target: Target, command: HostCommand) -> Result<Vec<NodeStatus>> {
        let (reply, response) = oneshot::channel();
        let job = Job::Execute {
            target,
            command,
            reply,
        };
        self.submit(job, response).await?
    }

    pub async fn query(&self) -> Result<Vec<NodeStatus>> {
        let (reply, response) = oneshot::channel();
        self.submit(Job::Query { reply }, response).await
    }

    pub async fn all_off(&self) -> Result<Vec<(String, Result<()>)>> {
        let (reply, response) = oneshot::channel();
        self.submit(Job::AllOff { reply }, response).await
    }
}
