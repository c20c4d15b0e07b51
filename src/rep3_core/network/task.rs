//! The non-blocking I/O layer.
//!
//! Two dedicated threads (one per neighbor channel) work off queues of read
//! and write tasks. The protocol thread enqueues tasks and synchronizes with
//! [IoLayer::wait_for_completion], which is the round barrier of the core.
use std::{
    borrow::Borrow,
    collections::VecDeque,
    io::{self, ErrorKind},
    sync::{
        mpsc::{channel, sync_channel, Receiver, RecvError, Sender, SyncSender, TryRecvError},
        Mutex,
    },
    thread::{self, JoinHandle},
};

use crate::rep3_core::party::CombinedCommStats;
use lazy_static::lazy_static;
#[cfg(feature = "verbose-timing")]
use {crate::rep3_core::party::Timer, std::time::Instant};

use super::{non_blocking::NonBlockingCommChannel, receiver, CommChannel, NetSerializable};

/// The neighbor a task talks to.
#[derive(Copy, Clone, Debug)]
pub enum Direction {
    /// Party `i+1`.
    Next,
    /// Party `i-1`.
    Previous,
}

pub enum Task {
    Write {
        direction: Direction,
        data: Vec<u8>,
    },
    Read {
        direction: Direction,
        length: usize,
        mailback: oneshot::Sender<Vec<u8>>,
    },
    Sync {
        /// if true, write comm stats to [IO_COMM_STATS] and reset the stats
        write_comm_stats: bool,
    },
}

struct ReadTask {
    buffer: Vec<u8>,
    length: usize,
    offset: usize,
    mailback: oneshot::Sender<Vec<u8>>,
}

impl ReadTask {
    pub fn new(length: usize, mailback: oneshot::Sender<Vec<u8>>) -> Self {
        Self {
            buffer: vec![0u8; length],
            length,
            offset: 0,
            mailback,
        }
    }
}

struct WriteTask {
    buffer: Vec<u8>,
    offset: usize,
}

impl WriteTask {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer, offset: 0 }
    }
}

struct TaskQueue<T> {
    queue: VecDeque<T>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn put(&mut self, t: T) {
        self.queue.push_back(t);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    pub fn peek(&mut self) -> Option<&mut T> {
        self.queue.front_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

enum State {
    WaitingForTasks,
    Working {
        sync_requested: bool,
        close_requested: bool,
        write_comm_stats_requested: bool,
    },
    Sync {
        close_requested: bool,
        write_comm_stats: bool,
    },
    Close,
}

impl State {
    pub fn is_working(&self) -> bool {
        matches!(self, Self::Working { .. })
    }
}

struct IoThreadContext {
    comm: NonBlockingCommChannel,
    task_receiver: Receiver<Task>,
    read_queue: TaskQueue<ReadTask>,
    write_queue: TaskQueue<WriteTask>,
    sync: SyncSender<()>,
    state: State,
}

impl IoThreadContext {
    pub fn new(comm: CommChannel, task_channel: Receiver<Task>) -> io::Result<(Self, Receiver<()>)> {
        let (send, receive) = sync_channel(0); // bound 0 creates a rendez-vous channel
        Ok((
            Self {
                comm: NonBlockingCommChannel::from_channel(comm)?,
                task_receiver: task_channel,
                read_queue: TaskQueue::new(),
                write_queue: TaskQueue::new(),
                sync: send,
                state: State::WaitingForTasks,
            },
            receive,
        ))
    }

    fn handle_io(&mut self, my_direction: Direction) -> io::Result<()> {
        loop {
            match self.state {
                State::WaitingForTasks => {
                    // wait for new tasks, this blocks
                    match self.task_receiver.recv() {
                        Ok(task) => {
                            self.add_task(task); // this changes state
                            if self.state.is_working() {
                                if !self.write_queue.is_empty() {
                                    Self::non_blocking_write(&mut self.comm, &mut self.write_queue)?;
                                }
                                if !self.read_queue.is_empty() {
                                    Self::non_blocking_read(&mut self.comm, &mut self.read_queue)?;
                                }
                                if self.write_queue.is_empty() && self.read_queue.is_empty() {
                                    // the added task was small enough to be completed right away
                                    self.state = State::WaitingForTasks;
                                }
                            }
                        }
                        Err(RecvError) => {
                            // the sender disconnected, this indicates closing
                            self.state = State::Close;
                        }
                    }
                }
                State::Working {
                    sync_requested,
                    close_requested,
                    write_comm_stats_requested,
                } => {
                    if self.read_queue.is_empty() && self.write_queue.is_empty() {
                        self.state = if sync_requested {
                            State::Sync {
                                close_requested,
                                write_comm_stats: write_comm_stats_requested,
                            }
                        } else if close_requested {
                            State::Close
                        } else {
                            // nothing to do, wait for new tasks
                            State::WaitingForTasks
                        };
                    } else {
                        // there is work to do
                        if !self.write_queue.is_empty() {
                            Self::non_blocking_write(&mut self.comm, &mut self.write_queue)?;
                        }
                        if !self.read_queue.is_empty() {
                            Self::non_blocking_read(&mut self.comm, &mut self.read_queue)?;
                        }
                        // let's see if new tasks are available
                        self.add_new_tasks_non_blocking();
                    }
                }
                State::Sync {
                    close_requested,
                    write_comm_stats,
                } => {
                    if write_comm_stats {
                        // write and reset the communication statistics
                        let stats = self.comm.get_comm_stats();
                        self.comm.reset_comm_stats();
                        let mut guard = IO_COMM_STATS.lock().unwrap();
                        match my_direction {
                            Direction::Next => guard.next = stats,
                            Direction::Previous => guard.prev = stats,
                        }
                        drop(guard);
                    }

                    // the protocol wants to sync and all tasks are done
                    match self.sync.send(()) {
                        Ok(()) => {
                            self.state = if close_requested {
                                State::Close // sync took place, close
                            } else {
                                State::WaitingForTasks // sync took place, wait for new tasks
                            };
                        }
                        Err(_) => panic!("The receiver for the sync channel was dropped."),
                    }
                }
                State::Close => {
                    // graceful closing
                    debug_assert!(self.read_queue.is_empty() && self.write_queue.is_empty());
                    return Ok(());
                }
            }
        }
    }

    fn add_task(&mut self, task: Task) {
        match task {
            Task::Read {
                direction: _,
                length,
                mailback,
            } => {
                self.read_queue.put(ReadTask::new(length, mailback));
                if !self.state.is_working() {
                    self.state = State::Working {
                        sync_requested: false,
                        close_requested: false,
                        write_comm_stats_requested: false,
                    }
                }
            }

            Task::Write { direction: _, data } => {
                self.write_queue.put(WriteTask::new(data));
                if !self.state.is_working() {
                    self.state = State::Working {
                        sync_requested: false,
                        close_requested: false,
                        write_comm_stats_requested: false,
                    }
                }
            }

            Task::Sync { write_comm_stats } => {
                if let State::Working {
                    close_requested,
                    write_comm_stats_requested,
                    ..
                } = self.state
                {
                    // there are tasks left that will be completed before sync
                    self.state = State::Working {
                        sync_requested: true,
                        close_requested,
                        write_comm_stats_requested: write_comm_stats | write_comm_stats_requested,
                    };
                } else {
                    self.state = State::Sync {
                        close_requested: false,
                        write_comm_stats,
                    };
                }
            }
        }
    }

    fn add_new_tasks_non_blocking(&mut self) {
        let mut cont = true;
        while cont && self.state.is_working() {
            match self.task_receiver.try_recv() {
                Ok(task) => {
                    self.add_task(task);
                }
                Err(TryRecvError::Empty) => cont = false,
                Err(TryRecvError::Disconnected) => {
                    // the sender disconnected, this indicates closing
                    cont = false;
                    if let State::Working {
                        sync_requested,
                        write_comm_stats_requested,
                        ..
                    } = self.state
                    {
                        self.state = State::Working {
                            sync_requested,
                            close_requested: true,
                            write_comm_stats_requested,
                        }
                    }
                }
            }
        }
    }

    fn non_blocking_read(
        channel: &mut NonBlockingCommChannel,
        read_task_queue: &mut TaskQueue<ReadTask>,
    ) -> io::Result<()> {
        match read_task_queue.peek() {
            Some(read_task) => {
                let buf = &mut read_task.buffer[read_task.offset..];
                match channel.read(buf) {
                    Ok(n) => {
                        read_task.offset += n;
                        if read_task.offset >= read_task.length {
                            // task is done
                            let t = read_task_queue.pop().unwrap(); // this should not panic since we peeked before
                            channel.bytes_received += t.length as u64;
                            channel.rounds += 1;
                            // send the result back
                            t.mailback
                                .send(t.buffer)
                                .expect("Cannot send read result back; receiver was dropped.");
                        }
                        Ok(())
                    }
                    Err(io_err) => {
                        // a few error types are expected, and are not an error
                        if io_err.kind() == ErrorKind::WouldBlock
                            || io_err.kind() == ErrorKind::Interrupted
                        {
                            return Ok(()); // all is well, we try again later
                        }
                        Err(io_err)
                    }
                }
            }
            None => Ok(()), // no read task, nothing to do
        }
    }

    fn non_blocking_write(
        channel: &mut NonBlockingCommChannel,
        write_task_queue: &mut TaskQueue<WriteTask>,
    ) -> io::Result<()> {
        match write_task_queue.peek() {
            Some(write_task) => {
                match channel.write(&write_task.buffer[write_task.offset..]) {
                    Ok(n) => {
                        write_task.offset += n;
                        if write_task.offset >= write_task.buffer.len() {
                            // task is done
                            channel.bytes_sent += write_task.buffer.len() as u64;
                            channel.rounds += 1;
                            write_task_queue.pop();
                        }
                        Ok(())
                    }
                    Err(io_err) => {
                        if io_err.kind() == ErrorKind::WouldBlock
                            || io_err.kind() == ErrorKind::Interrupted
                        {
                            return Ok(()); // all is well, we try again later
                        }
                        Err(io_err)
                    }
                }
            }
            None => Ok(()), // no write task, nothing to do
        }
    }
}

/// Handle to the two I/O threads of a party.
pub struct IoLayer {
    task_prev_channel: Sender<Task>,
    task_next_channel: Sender<Task>,
    sync_prev_channel: Receiver<()>,
    sync_next_channel: Receiver<()>,
    io_prev_thread_handle: JoinHandle<(IoThreadContext, io::Result<()>)>,
    io_next_thread_handle: JoinHandle<(IoThreadContext, io::Result<()>)>,
}

#[cfg(feature = "verbose-timing")]
lazy_static! {
    pub static ref IO_TIMER: Mutex<Timer> = Mutex::new(Timer::new());
}

lazy_static! {
    static ref IO_COMM_STATS: Mutex<CombinedCommStats> = Mutex::new(CombinedCommStats::empty());
}

impl IoLayer {
    pub fn spawn_io(comm_prev: CommChannel, comm_next: CommChannel) -> io::Result<Self> {
        // setup thread for I/O to prev party
        let (send_prev, rcv_prev) = channel();
        let (mut ctx_prev, sync_receiver_prev) = IoThreadContext::new(comm_prev, rcv_prev)?;

        // setup thread for I/O to next party
        let (send_next, rcv_next) = channel();
        let (mut ctx_next, sync_receiver_next) = IoThreadContext::new(comm_next, rcv_next)?;

        let handle_prev = thread::Builder::new()
            .name("io-prev".to_string())
            .spawn(move || {
                let res = ctx_prev.handle_io(Direction::Previous);
                res.unwrap();
                (ctx_prev, Ok(()))
            })?;
        let handle_next = thread::Builder::new()
            .name("io-next".to_string())
            .spawn(move || {
                let res = ctx_next.handle_io(Direction::Next);
                res.unwrap();
                (ctx_next, Ok(()))
            })?;

        Ok(Self {
            task_prev_channel: send_prev,
            task_next_channel: send_next,
            sync_prev_channel: sync_receiver_prev,
            sync_next_channel: sync_receiver_next,
            io_prev_thread_handle: handle_prev,
            io_next_thread_handle: handle_next,
        })
    }

    pub fn send(&self, direction: Direction, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            let channel = match direction {
                Direction::Previous => &self.task_prev_channel,
                Direction::Next => &self.task_next_channel,
            };
            match channel.send(Task::Write {
                direction,
                data: bytes,
            }) {
                Ok(()) => (),
                Err(_) => panic!("The IO is already closed"),
            }
        }
    }

    pub fn receive(&self, direction: Direction, length: usize) -> receiver::VecReceiver {
        receiver::VecReceiver::new(self.receive_raw(direction, length))
    }

    fn receive_raw(&self, direction: Direction, length: usize) -> oneshot::Receiver<Vec<u8>> {
        let (send, recv) = oneshot::channel();
        if length > 0 {
            let channel = match direction {
                Direction::Previous => &self.task_prev_channel,
                Direction::Next => &self.task_next_channel,
            };
            match channel.send(Task::Read {
                direction,
                length,
                mailback: send,
            }) {
                Ok(()) => recv,
                Err(_) => panic!("The IO is already closed"),
            }
        } else {
            // immediately populate recv
            send.send(Vec::new()).unwrap(); // this is safe since `send` returns Err only if recv has been dropped
            recv
        }
    }

    pub fn receive_slice<'a>(
        &self,
        direction: Direction,
        dst: &'a mut [u8],
    ) -> receiver::SliceReceiver<'a> {
        receiver::SliceReceiver::new(self.receive_raw(direction, dst.len()), dst)
    }

    pub fn send_field<'a, T: NetSerializable + 'a>(
        &self,
        direction: Direction,
        elements: impl IntoIterator<Item = impl Borrow<T>>,
        len: usize,
    ) {
        #[cfg(feature = "verbose-timing")]
        let start = Instant::now();
        let as_bytes = T::as_byte_vec(elements, len);
        #[cfg(feature = "verbose-timing")]
        IO_TIMER.lock().unwrap().report_time("ser", start.elapsed());
        self.send(direction, as_bytes)
    }

    pub fn send_field_slice<T: NetSerializable>(&self, direction: Direction, elements: &[T]) {
        self.send(direction, T::as_byte_vec_slice(elements))
    }

    pub fn receive_field<T: NetSerializable>(
        &self,
        direction: Direction,
        num_elements: usize,
    ) -> receiver::NetVectorReceiver<T> {
        receiver::NetVectorReceiver::new(
            self.receive_raw(direction, T::serialized_size(num_elements)),
            num_elements,
        )
    }

    pub fn receive_field_slice<'a, T: NetSerializable>(
        &self,
        direction: Direction,
        dst: &'a mut [T],
    ) -> receiver::NetSliceReceiver<'a, T> {
        let receiver = self.receive_raw(direction, T::serialized_size(dst.len()));
        receiver::NetSliceReceiver::new(receiver, dst)
    }

    /// Blocks until all queued read and write tasks on both channels are
    /// complete. This is the synchronization barrier of the protocol layer.
    pub fn wait_for_completion(&self) {
        match (
            self.task_prev_channel.send(Task::Sync {
                write_comm_stats: false,
            }),
            self.task_next_channel.send(Task::Sync {
                write_comm_stats: false,
            }),
        ) {
            (Ok(()), Ok(())) => {
                let sync_prev = self.sync_prev_channel.recv();
                let sync_next = self.sync_next_channel.recv();
                match (sync_prev, sync_next) {
                    (Ok(()), Ok(())) => (),
                    _ => panic!("The IO is already closed"),
                }
            }
            _ => panic!("The IO is already closed"),
        }
    }

    pub fn shutdown(self) -> io::Result<(NonBlockingCommChannel, NonBlockingCommChannel)> {
        // first send Sync task
        match self.task_prev_channel.send(Task::Sync {
            write_comm_stats: false,
        }) {
            Ok(()) => (),
            Err(_) => {
                return Err(io::Error::new(
                    ErrorKind::NotConnected,
                    "Task channel to prev no longer connected",
                ))
            }
        }
        match self.task_next_channel.send(Task::Sync {
            write_comm_stats: false,
        }) {
            Ok(()) => (),
            Err(_) => {
                return Err(io::Error::new(
                    ErrorKind::NotConnected,
                    "Task channel to next no longer connected",
                ))
            }
        }
        // then close task channel to indicate closing
        drop(self.task_prev_channel);
        drop(self.task_next_channel);
        // then wait for sync
        match self.sync_prev_channel.recv() {
            Ok(()) => (),
            Err(_) => {
                return Err(io::Error::new(
                    ErrorKind::NotConnected,
                    "Sync channel to prev no longer connected",
                ))
            }
        }
        match self.sync_next_channel.recv() {
            Ok(()) => (),
            Err(_) => {
                return Err(io::Error::new(
                    ErrorKind::NotConnected,
                    "Sync channel to next no longer connected",
                ))
            }
        }
        // finally wait for IO threads
        let res_prev = match self.io_prev_thread_handle.join() {
            Ok((ctx_prev, Ok(()))) => Ok(ctx_prev.comm),
            Ok((_, Err(io_err_prev))) => Err(io_err_prev),
            Err(_join_err) => Err(io::Error::new(
                ErrorKind::Other,
                "Error when joining the I/O thread of prev",
            )),
        };
        let res_next = match self.io_next_thread_handle.join() {
            Ok((ctx_next, Ok(()))) => Ok(ctx_next.comm),
            Ok((_, Err(io_err_next))) => Err(io_err_next),
            Err(_join_err) => Err(io::Error::new(
                ErrorKind::Other,
                "Error when joining the I/O thread of next",
            )),
        };
        match (res_prev, res_next) {
            (Ok(comm_prev), Ok(comm_next)) => Ok((comm_prev, comm_next)),
            (Err(err), _) => Err(err),
            (_, Err(err)) => Err(err),
        }
    }

    /// Synchronizes both channels, then returns and resets their byte/round
    /// counters. Round-count tests use this to instrument the communicator.
    pub fn reset_comm_stats(&self) -> CombinedCommStats {
        match (
            self.task_prev_channel.send(Task::Sync {
                write_comm_stats: true,
            }),
            self.task_next_channel.send(Task::Sync {
                write_comm_stats: true,
            }),
        ) {
            (Ok(()), Ok(())) => {
                let sync_prev = self.sync_prev_channel.recv();
                let sync_next = self.sync_next_channel.recv();
                match (sync_prev, sync_next) {
                    (Ok(()), Ok(())) => {
                        let mut guard = IO_COMM_STATS.lock().unwrap();
                        let comm_stats = *guard;
                        guard.prev.reset();
                        guard.next.reset();
                        comm_stats
                    }
                    _ => panic!("The IO is already closed"),
                }
            }
            _ => panic!("The IO is already closed"),
        }
    }
}

impl NonBlockingCommChannel {
    fn get_comm_stats(&self) -> crate::rep3_core::party::CommStats {
        crate::rep3_core::party::CommStats::new(self.bytes_received, self.bytes_sent, self.rounds)
    }

    fn reset_comm_stats(&mut self) {
        self.bytes_sent = 0;
        self.bytes_received = 0;
        self.rounds = 0;
    }
}
