use super::common::*;
use debug_print::*;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, Write};

/// Reads square coefficient blocks as whitespace separated integers in
/// raster order.
pub struct BlockReader<'a> {
    input: Box<dyn BufRead + 'a>,
    pending: VecDeque<Coeff>,
    line: usize,
}

impl<'a> BlockReader<'a> {
    pub fn standard(stdin: &'a io::Stdin) -> BlockReader<'a> {
        BlockReader {
            input: Box::new(stdin.lock()),
            pending: VecDeque::new(),
            line: 0,
        }
    }

    pub fn file(path: &str) -> io::Result<BlockReader<'a>> {
        File::open(path).map(|file| BlockReader {
            input: Box::new(io::BufReader::new(file)),
            pending: VecDeque::new(),
            line: 0,
        })
    }

    pub fn slice(v: &'a [u8]) -> BlockReader<'a> {
        BlockReader {
            input: Box::new(v),
            pending: VecDeque::new(),
            line: 0,
        }
    }

    fn fill(&mut self, count: usize) -> io::Result<()> {
        let mut buf = String::new();
        while self.pending.len() < count {
            buf.clear();
            if self.input.read_line(&mut buf)? == 0 {
                break;
            }
            self.line += 1;
            for token in buf.split_whitespace() {
                let v = token.parse::<Coeff>().map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("line {}: '{}' is not a coefficient", self.line, token),
                    )
                })?;
                if !(COEFF_MIN..=COEFF_MAX).contains(&v) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("line {}: {} is out of the coefficient range", self.line, v),
                    ));
                }
                self.pending.push_back(v);
            }
        }
        Ok(())
    }

    /// Returns the next block of `count` values, or `None` at the end of the
    /// input. A truncated block is an error.
    pub fn read_block(&mut self, count: usize) -> io::Result<Option<Vec<Coeff>>> {
        self.fill(count)?;
        if self.pending.is_empty() {
            return Ok(None);
        }
        if self.pending.len() < count {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} coefficients, got {}", count, self.pending.len()),
            ));
        }
        debug_eprintln!("block of {} read, line {}", count, self.line);
        Ok(Some(self.pending.drain(..count).collect()))
    }
}

pub struct BlockWriter<'a> {
    output: Box<dyn Write + 'a>,
}

impl<'a> BlockWriter<'a> {
    pub fn standard(stdout: &'a io::Stdout) -> BlockWriter<'a> {
        BlockWriter {
            output: Box::new(stdout.lock()),
        }
    }

    pub fn file(path: &str) -> io::Result<BlockWriter<'a>> {
        File::create(path).map(|file| BlockWriter {
            output: Box::new(io::BufWriter::new(file)),
        })
    }

    pub fn vec(v: &'a mut Vec<u8>) -> BlockWriter<'a> {
        BlockWriter { output: Box::new(v) }
    }

    /// Writes `block` as `width` right aligned columns under a header line.
    pub fn write_block(&mut self, label: &str, block: &[Coeff], width: usize) -> io::Result<()> {
        writeln!(self.output, "{}:", label)?;
        for row in block.chunks(width) {
            let row = row.iter().map(|v| format!("{:6}", v)).collect::<Vec<_>>();
            writeln!(self.output, "{}", row.join(""))?;
        }
        Ok(())
    }

    pub fn write_value<T: std::fmt::Display>(&mut self, label: &str, value: T) -> io::Result<()> {
        writeln!(self.output, "{}: {}", label, value)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}
