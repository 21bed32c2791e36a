// BRIGHTNESSD WRITE LOG
// RECORDS EVERY PHYSICAL BACKLIGHT WRITE DURING SERVICE EXECUTION.
// PRE-ALLOCATED RING BUFFER. NO HEAP ALLOCATION WHILE RUNNING.
// WRAPS AROUND AT CAPACITY -- OLDEST ENTRIES OVERWRITTEN.

const MAX_RECORDS: usize = 4096;

#[derive(Clone, Copy)]
pub struct WriteRecord {
    pub ts_ns: u64,
    pub level: i32,
}

pub struct WriteLog {
    records: Vec<WriteRecord>,
    head: usize,
    len: usize,
}

impl WriteLog {
    pub fn new() -> Self {
        Self {
            records: vec![WriteRecord { ts_ns: 0, level: 0 }; MAX_RECORDS],
            head: 0,
            len: 0,
        }
    }

    // RECORD ONE PHYSICAL WRITE. OVERWRITES OLDEST ENTRY WHEN FULL.
    pub fn record(&mut self, level: i32) {
        self.records[self.head] = WriteRecord {
            ts_ns: now_ns(),
            level,
        };
        self.head = (self.head + 1) % MAX_RECORDS;
        if self.len < MAX_RECORDS {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // ITERATE RECORDS IN CHRONOLOGICAL ORDER
    fn iter_chronological(&self) -> impl Iterator<Item = &WriteRecord> {
        let start = if self.len < MAX_RECORDS { 0 } else { self.head };
        (0..self.len).map(move |i| &self.records[(start + i) % MAX_RECORDS])
    }

    // DUMP THE TIME SERIES AFTER EXECUTION
    pub fn dump(&self) {
        if self.len == 0 {
            return;
        }

        let mut iter = self.iter_chronological();
        let first = iter.next().unwrap();
        let base_ts = first.ts_ns;

        println!("\n{:<10} {:<8}", "TIME_S", "LEVEL");
        println!("{}", "-".repeat(20));
        println!("{:<10.3} {:<8}", 0.0, first.level);
        for r in iter {
            let elapsed_s = (r.ts_ns - base_ts) as f64 / 1_000_000_000.0;
            println!("{:<10.3} {:<8}", elapsed_s, r.level);
        }

        if self.len == MAX_RECORDS {
            println!("\n(RING BUFFER WRAPPED -- SHOWING MOST RECENT {} WRITES)", MAX_RECORDS);
        }
        println!("TOTAL WRITES: {}", self.len);
    }

    // SUMMARY STATISTICS
    pub fn summary(&self) {
        if self.len == 0 {
            return;
        }

        let records: Vec<&WriteRecord> = self.iter_chronological().collect();
        let min = records.iter().map(|r| r.level).min().unwrap_or(0);
        let max = records.iter().map(|r| r.level).max().unwrap_or(0);
        let last = records.last().unwrap().level;
        let elapsed_ns = records.last().unwrap().ts_ns - records.first().unwrap().ts_ns;
        let elapsed_s = elapsed_ns as f64 / 1_000_000_000.0;

        println!("\n{}", "=".repeat(40));
        println!("BRIGHTNESSD WRITE SUMMARY");
        println!("{}", "=".repeat(40));
        println!("  TOTAL WRITES:  {}", self.len);
        println!("  LEVEL RANGE:   {}..{}", min, max);
        println!("  FINAL LEVEL:   {}", last);
        println!("  ELAPSED:       {:.1}s", elapsed_s);
        if elapsed_s > 0.0 {
            println!("  WRITES/S:      {:.1}", self.len as f64 / elapsed_s);
        }
    }
}

impl Default for WriteLog {
    fn default() -> Self {
        Self::new()
    }
}

pub fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}
