//! Deterministic stand-in for a device socket.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    io::{self, Read, Write},
    rc::Rc,
};

use super::DeviceStream;

enum Step {
    Data(Vec<u8>),
    Fail(io::ErrorKind),
}

/// Replays pre-cut chunks, one chunk (or part of one) per `read`, then
/// reports the peer as closed.
pub(crate) struct ScriptedStream {
    steps: VecDeque<Step>,
    written: Rc<RefCell<Vec<u8>>>,
    shutdowns: Rc<Cell<usize>>,
    shutdown_error: Option<io::ErrorKind>,
}

impl ScriptedStream {
    pub(crate) fn new(chunks: &[&[u8]]) -> Self {
        Self {
            steps: chunks.iter().map(|c| Step::Data(c.to_vec())).collect(),
            written: Rc::default(),
            shutdowns: Rc::default(),
            shutdown_error: None,
        }
    }

    pub(crate) fn then_send(mut self, chunk: &[u8]) -> Self {
        self.steps.push_back(Step::Data(chunk.to_vec()));
        self
    }

    pub(crate) fn then_fail(mut self, kind: io::ErrorKind) -> Self {
        self.steps.push_back(Step::Fail(kind));
        self
    }

    pub(crate) fn failing_shutdown(mut self, kind: io::ErrorKind) -> Self {
        self.shutdown_error = Some(kind);
        self
    }

    pub(crate) fn written(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.written)
    }

    pub(crate) fn shutdowns(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.shutdowns)
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            None => Ok(0),
            Some(Step::Fail(kind)) => Err(kind.into()),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.steps.push_front(Step::Data(data.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DeviceStream for ScriptedStream {
    fn shutdown(&self) -> io::Result<()> {
        self.shutdowns.set(self.shutdowns.get() + 1);
        match self.shutdown_error {
            Some(kind) => Err(kind.into()),
            None => Ok(()),
        }
    }
}
