use super::commands::CommandStatus;
use crossterm::cursor::MoveToPreviousLine;
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;
use std::io::{self, Write};

/// In-place table of command statuses, redrawn after every poll.
pub struct StatusTable<W: Write> {
    out: W,
    drawn: u16,
}

impl<W: Write> StatusTable<W> {
    pub fn new(out: W) -> Self {
        Self { out, drawn: 0 }
    }

    pub fn render<I>(&mut self, rows: I) -> io::Result<()>
    where
        I: IntoIterator<Item = (String, CommandStatus)>,
    {
        let rows: Vec<(String, CommandStatus)> = rows.into_iter().collect();
        let width = rows.iter().map(|(name, _)| name.chars().count()).max().unwrap_or(0);

        if self.drawn > 0 {
            self.out
                .queue(MoveToPreviousLine(self.drawn))?
                .queue(Clear(ClearType::FromCursorDown))?;
        }
        for (name, status) in &rows {
            writeln!(self.out, "{:<width$}  {}", name, status, width = width)?;
        }
        self.drawn = rows.len().min(u16::MAX as usize) as u16;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
