use std::marker::PhantomData;

use super::NetSerializable;
#[cfg(feature = "verbose-timing")]
use {crate::rep3_core::network::task::IO_TIMER, std::time::Instant};

/// Handle for a pending receive of `expected_len` elements.
#[must_use]
pub struct NetVectorReceiver<T: NetSerializable> {
    inner: oneshot::Receiver<Vec<u8>>,
    expected_len: usize,
    phantom: PhantomData<T>,
}

impl<T: NetSerializable> NetVectorReceiver<T> {
    pub fn new(inner: oneshot::Receiver<Vec<u8>>, expected_len: usize) -> Self {
        Self {
            inner,
            expected_len,
            phantom: PhantomData,
        }
    }

    /// Blocks until the message arrived and deserializes it.
    pub fn rcv(self) -> Result<Vec<T>, oneshot::RecvError> {
        #[cfg(feature = "verbose-timing")]
        let start = Instant::now();
        let bytes = self.inner.recv()?;
        #[cfg(feature = "verbose-timing")]
        IO_TIMER.lock().unwrap().report_time("io", start.elapsed());
        Ok(T::from_byte_vec(bytes, self.expected_len))
    }
}

/// Handle for a pending receive that deserializes into a provided slice.
#[must_use]
pub struct NetSliceReceiver<'a, T: NetSerializable> {
    inner: oneshot::Receiver<Vec<u8>>,
    slice: &'a mut [T],
}

impl<'a, T: NetSerializable> NetSliceReceiver<'a, T> {
    pub fn new(inner: oneshot::Receiver<Vec<u8>>, slice: &'a mut [T]) -> Self {
        Self { inner, slice }
    }

    pub fn rcv(self) -> Result<(), oneshot::RecvError> {
        let bytes = self.inner.recv()?;
        T::from_byte_slice(bytes, self.slice);
        Ok(())
    }
}

/// Handle for a pending receive of raw bytes.
#[must_use]
pub struct VecReceiver {
    inner: oneshot::Receiver<Vec<u8>>,
}

impl VecReceiver {
    pub fn new(inner: oneshot::Receiver<Vec<u8>>) -> Self {
        Self { inner }
    }

    pub fn recv(self) -> Result<Vec<u8>, oneshot::RecvError> {
        self.inner.recv()
    }
}

/// Handle for a pending receive of raw bytes into a provided buffer.
#[must_use]
pub struct SliceReceiver<'a> {
    inner: oneshot::Receiver<Vec<u8>>,
    slice: &'a mut [u8],
}

impl<'a> SliceReceiver<'a> {
    pub fn new(inner: oneshot::Receiver<Vec<u8>>, slice: &'a mut [u8]) -> Self {
        Self { inner, slice }
    }

    pub fn rcv(self) -> Result<(), oneshot::RecvError> {
        let bytes = self.inner.recv()?;
        self.slice.copy_from_slice(&bytes);
        Ok(())
    }
}
