//! Numbered runbook builder for provisioning output. Each user-facing action
//! gets the next step number; notes and blank lines do not advance the
//! counter.

#[derive(Debug)]
pub struct Runbook {
    next_step: usize,
    lines: Vec<String>,
}

impl Runbook {
    pub fn new() -> Self {
        Runbook {
            next_step: 1,
            lines: Vec::new(),
        }
    }

    pub fn step(&mut self, text: impl AsRef<str>) {
        self.lines
            .push(format!("STEP {}: {}", self.next_step, text.as_ref()));
        self.next_step += 1;
    }

    pub fn note(&mut self, text: impl AsRef<str>) {
        self.lines.push(text.as_ref().to_string());
    }

    pub fn blank(&mut self) {
        self.lines.push(String::new());
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

impl Default for Runbook {
    fn default() -> Self {
        Runbook::new()
    }
}
