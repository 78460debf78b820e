//! Appends one CSV row per window when `TRAINING_MODE=1`, skipping a
//! configurable warmup count. The header is written only when the file is
//! empty, so re-running against the same path keeps appending rather than
//! duplicating the header.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::window::WindowRecord;

const HEADER: &str = "run_id,workload,force,window_idx,t_ms,dt_ms,hw_threads,pcore_threads,pcore_count,ecore_count,\
total_cores,\
p_inst_retired,p_core_cycles,p_mem_inst_retired,p_cache_load_miss,p_mem_stall_cycles,p_page_faults,p_uops_retired,\
e_inst_retired,e_core_cycles,e_mem_inst_retired,e_cache_load_miss,e_mem_stall_cycles,e_page_faults,e_uops_retired,\
p_rchar,p_wchar,p_syscr,p_syscw,p_read_bytes,p_write_bytes,\
e_rchar,e_wchar,e_syscr,e_syscw,e_read_bytes,e_write_bytes,\
ipc,cache_miss_ratio,uop_per_cycle,mem_stall_per_mem_inst,mem_stall_per_inst,fault_rate_per_mem_instr,\
rchar_per_cycle,wchar_per_cycle,rbytes_per_cycle,wbytes_per_cycle,\
p_ipc,p_cache_miss_ratio,p_uop_per_cycle,p_mem_stall_per_mem_inst,p_mem_stall_per_inst,p_fault_rate_per_mem_instr,\
p_rchar_per_cycle,p_wchar_per_cycle,p_rbytes_per_cycle,p_wbytes_per_cycle,\
e_ipc,e_cache_miss_ratio,e_uop_per_cycle,e_mem_stall_per_mem_inst,e_mem_stall_per_inst,e_fault_rate_per_mem_instr,\
e_rchar_per_cycle,e_wchar_per_cycle,e_rbytes_per_cycle,e_wbytes_per_cycle\n";

pub struct TrainingWriter {
    file: std::fs::File,
    run_id: String,
    workload: String,
    force: String,
}

impl TrainingWriter {
    pub fn open(
        path: &Path,
        run_id: Option<&str>,
        workload: Option<&str>,
        force: Option<&str>,
    ) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).read(true).open(path)?;
        let is_empty = file.seek(SeekFrom::End(0))? == 0;
        if is_empty {
            file.write_all(HEADER.as_bytes())?;
            file.flush()?;
        }
        Ok(TrainingWriter {
            file,
            run_id: run_id.unwrap_or_default().to_string(),
            workload: workload.unwrap_or_default().to_string(),
            force: force.unwrap_or_default().to_string(),
        })
    }

    pub fn append(&mut self, window_idx: u64, record: &WindowRecord) -> std::io::Result<()> {
        let r = &record.ratios;
        let pr = &record.p_ratios;
        let er = &record.e_ratios;
        let row = format!(
            "{run_id},{workload},{force},{window_idx},{t_ms:.3},{dt_ms:.3},{hw},{pthreads},{pcores},{ecores},{total_cores},\
             {pc0},{pc1},{pc2},{pc3},{pc4},{pc5},{pc6},\
             {ec0},{ec1},{ec2},{ec3},{ec4},{ec5},{ec6},\
             {p_rchar},{p_wchar},{p_syscr},{p_syscw},{p_rb},{p_wb},\
             {e_rchar},{e_wchar},{e_syscr},{e_syscw},{e_rb},{e_wb},\
             {ipc},{cmr},{upc},{mspmi},{mspi},{frpmi},{rcpc},{wcpc},{rbpc},{wbpc},\
             {p_ipc},{p_cmr},{p_upc},{p_mspmi},{p_mspi},{p_frpmi},{p_rcpc},{p_wcpc},{p_rbpc},{p_wbpc},\
             {e_ipc},{e_cmr},{e_upc},{e_mspmi},{e_mspi},{e_frpmi},{e_rcpc},{e_wcpc},{e_rbpc},{e_wbpc}\n",
            run_id = self.run_id,
            workload = self.workload,
            force = self.force,
            window_idx = window_idx,
            t_ms = record.exec_time_ms,
            dt_ms = record.dt_ms,
            hw = record.hw_thread_count,
            pthreads = record.pthread_count,
            pcores = record.pcore_count,
            ecores = record.ecore_count,
            total_cores = record.total_cores,
            pc0 = record.p_counter_totals[0], pc1 = record.p_counter_totals[1], pc2 = record.p_counter_totals[2],
            pc3 = record.p_counter_totals[3], pc4 = record.p_counter_totals[4], pc5 = record.p_counter_totals[5],
            pc6 = record.p_counter_totals[6],
            ec0 = record.e_counter_totals[0], ec1 = record.e_counter_totals[1], ec2 = record.e_counter_totals[2],
            ec3 = record.e_counter_totals[3], ec4 = record.e_counter_totals[4], ec5 = record.e_counter_totals[5],
            ec6 = record.e_counter_totals[6],
            p_rchar = record.p_io_delta.rchar, p_wchar = record.p_io_delta.wchar,
            p_syscr = record.p_io_delta.syscr, p_syscw = record.p_io_delta.syscw,
            p_rb = record.p_io_delta.read_bytes, p_wb = record.p_io_delta.write_bytes,
            e_rchar = record.e_io_delta.rchar, e_wchar = record.e_io_delta.wchar,
            e_syscr = record.e_io_delta.syscr, e_syscw = record.e_io_delta.syscw,
            e_rb = record.e_io_delta.read_bytes, e_wb = record.e_io_delta.write_bytes,
            ipc = r.ipc, cmr = r.cache_miss_ratio, upc = r.uop_per_cycle,
            mspmi = r.mem_stall_per_mem_inst, mspi = r.mem_stall_per_inst, frpmi = r.fault_rate_per_mem_instr,
            rcpc = r.rchar_per_cycle, wcpc = r.wchar_per_cycle, rbpc = r.rbytes_per_cycle, wbpc = r.wbytes_per_cycle,
            p_ipc = pr.ipc, p_cmr = pr.cache_miss_ratio, p_upc = pr.uop_per_cycle,
            p_mspmi = pr.mem_stall_per_mem_inst, p_mspi = pr.mem_stall_per_inst, p_frpmi = pr.fault_rate_per_mem_instr,
            p_rcpc = pr.rchar_per_cycle, p_wcpc = pr.wchar_per_cycle, p_rbpc = pr.rbytes_per_cycle, p_wbpc = pr.wbytes_per_cycle,
            e_ipc = er.ipc, e_cmr = er.cache_miss_ratio, e_upc = er.uop_per_cycle,
            e_mspmi = er.mem_stall_per_mem_inst, e_mspi = er.mem_stall_per_inst, e_frpmi = er.fault_rate_per_mem_instr,
            e_rcpc = er.rchar_per_cycle, e_wcpc = er.wchar_per_cycle, e_rbpc = er.rbytes_per_cycle, e_wbpc = er.wbytes_per_cycle,
        );
        self.file.write_all(row.as_bytes())?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_written_only_once() {
        let path = std::env::temp_dir().join(format!("training_test_{}.csv", std::process::id()));
        std::fs::remove_file(&path).ok();

        let record = WindowRecord {
            thread_count: 1,
            hw_thread_count: 16,
            pthread_count: 1,
            pcore_count: 1,
            ecore_count: 0,
            total_cores: 1,
            counter_totals: [0; crate::config::NUM_EVENTS],
            io_delta: Default::default(),
            ratios: Default::default(),
            p_counter_totals: [0; crate::config::NUM_EVENTS],
            p_io_delta: Default::default(),
            p_ratios: Default::default(),
            e_counter_totals: [0; crate::config::NUM_EVENTS],
            e_io_delta: Default::default(),
            e_ratios: Default::default(),
            exec_time_ms: 0.0,
            dt_ms: 100.0,
        };

        {
            let mut writer = TrainingWriter::open(&path, Some("run1"), Some("wl"), Some("P")).unwrap();
            writer.append(1, &record).unwrap();
        }
        {
            let mut writer = TrainingWriter::open(&path, Some("run1"), Some("wl"), Some("P")).unwrap();
            writer.append(2, &record).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("run_id,workload").count(), 1);
        std::fs::remove_file(&path).ok();
    }
}
