// end-of-run output: configuration echo, per-cache counters and system totals

use std::io::{self, Write};

use crate::coherence::{Cache, Statistics, SystemSpec};

pub fn write_config(out: &mut impl Write, specs: &SystemSpec, trace_name: &str) -> io::Result<()> {
    writeln!(out, "===== Simulator configuration =====")?;
    writeln!(out, "L1_SIZE:               {}", specs.cache_size)?;
    writeln!(out, "L1_ASSOC:              {}", specs.cache_assoc)?;
    writeln!(out, "L1_BLOCKSIZE:          {}", specs.block_size)?;
    writeln!(out, "NUMBER OF PROCESSORS:  {}", specs.num_procs)?;
    writeln!(out, "COHERENCE PROTOCOL:    {}", specs.protocol)?;
    writeln!(out, "TRACE FILE:            {}", trace_name)
}

pub fn write_stats(out: &mut impl Write, proc_id: usize, s: &Statistics) -> io::Result<()> {
    writeln!(out, "============ Simulation results (Cache {proc_id}) ============")?;
    writeln!(out, "01. number of reads:                     {}", s.reads())?;
    writeln!(out, "02. number of read misses:               {}", s.read_misses())?;
    writeln!(out, "03. number of writes:                    {}", s.writes())?;
    writeln!(out, "04. number of write misses:              {}", s.write_misses())?;
    writeln!(out, "05. total miss rate:                     {:.2}%", s.miss_rate())?;
    writeln!(out, "06. number of writebacks:                {}", s.writebacks())?;
    writeln!(out, "07. number of invalidations:             {}", s.invalidations())?;
    writeln!(out, "08. number of getM (ownership) messages: {}", s.get_m_msgs())?;
    writeln!(out, "09. number of silent upgrades:           {}", s.silent_upgrades())?;
    writeln!(out, "10. number of serviced from memory:      {}", s.serviced_from_mem())?;
    writeln!(out, "11. number of serviced from other core:  {}", s.serviced_from_peer())?;
    writeln!(out, "12. number of getS messages:             {}", s.get_s_msgs())?;
    writeln!(out, "13. number of blocks sent to memory:     {}", s.memory_transfers())
}

pub fn write_totals(out: &mut impl Write, stats: &[Statistics]) -> io::Result<()> {
    let total: Statistics = stats.iter().sum();
    writeln!(out, "============ System totals ============")?;
    writeln!(out, "Total invalidations: {}", total.invalidations())?;
    writeln!(out, "Total other cache:   {}", total.serviced_from_peer())?;
    writeln!(out, "Total writebacks:    {}", total.writebacks())?;
    writeln!(out, "Total getM:          {}", total.get_m_msgs())?;
    writeln!(out, "Total silent:        {}", total.silent_upgrades())
}

/// Per-cache statistics of a coordinator, in processor order.
pub fn collect(caches: &[Cache]) -> Vec<Statistics> {
    caches.iter().map(|c| c.stats().clone()).collect()
}
