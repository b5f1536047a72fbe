use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, EngineVersion};
use crate::collectors::errors::decode_rows;
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::fetch_gpperfmon;
use anyhow::{Error, Result};
use futures::future::BoxFuture;
use sqlx::FromRow;
use tracing::instrument;

const SYSTEM_SQL: &str = r"
    SELECT hostname::text,
           mem_total::float8, mem_used::float8, mem_actual_used::float8, mem_actual_free::float8,
           swap_total::float8, swap_used::float8, swap_page_in::float8, swap_page_out::float8,
           cpu_user::float8, cpu_sys::float8, cpu_idle::float8,
           load0::float8, load1::float8, load2::float8,
           disk_ro_rate::float8, disk_wo_rate::float8, disk_rb_rate::float8, disk_wb_rate::float8,
           net_rp_rate::float8, net_wp_rate::float8, net_rb_rate::float8, net_wb_rate::float8
    FROM system_now
";

macro_rules! node_gauges {
    ($($ident:ident => $name:literal, $help:literal;)*) => {
        $(
            static $ident: MetricDesc = MetricDesc::gauge(
                concat!("greenplum_node_", $name),
                $help,
                &["hostname"],
            );
        )*
    };
}

node_gauges! {
    MEM_TOTAL => "mem_total_bytes", "Total memory of the host";
    MEM_USED => "mem_used_bytes", "Used memory of the host, including buffers and cache";
    MEM_ACTUAL_USED => "mem_actual_used_bytes", "Memory used by processes on the host";
    MEM_ACTUAL_FREE => "mem_actual_free_bytes", "Memory available to processes on the host";
    SWAP_TOTAL => "swap_total_bytes", "Total swap space of the host";
    SWAP_USED => "swap_used_bytes", "Used swap space of the host";
    SWAP_PAGE_IN => "swap_page_in", "Pages swapped in";
    SWAP_PAGE_OUT => "swap_page_out", "Pages swapped out";
    CPU_USER => "cpu_user_percent", "CPU time spent in user mode";
    CPU_SYS => "cpu_sys_percent", "CPU time spent in kernel mode";
    CPU_IDLE => "cpu_idle_percent", "CPU idle time";
    LOAD_1M => "cpu_avg_usage_1m_percent", "Load average over one minute";
    LOAD_5M => "cpu_avg_usage_5m_percent", "Load average over five minutes";
    LOAD_15M => "cpu_avg_usage_15m_percent", "Load average over fifteen minutes";
    DISK_RO_RATE => "disk_ro_rate", "Disk read operations per second";
    DISK_WO_RATE => "disk_wo_rate", "Disk write operations per second";
    DISK_RB_RATE => "disk_rb_rate", "Disk bytes read per second";
    DISK_WB_RATE => "disk_wb_rate", "Disk bytes written per second";
    NET_RP_RATE => "net_rp_rate", "Network packets received per second";
    NET_WP_RATE => "net_wp_rate", "Network packets sent per second";
    NET_RB_RATE => "net_rb_rate", "Network bytes received per second";
    NET_WB_RATE => "net_wb_rate", "Network bytes sent per second";
}

/// Host-level resource usage reported by the performance monitor agents.
#[derive(Clone, Debug, Default)]
pub struct SystemScraper;

impl SystemScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[derive(Debug, FromRow)]
struct HostSystem {
    hostname: String,
    mem_total: f64,
    mem_used: f64,
    mem_actual_used: f64,
    mem_actual_free: f64,
    swap_total: f64,
    swap_used: f64,
    swap_page_in: f64,
    swap_page_out: f64,
    cpu_user: f64,
    cpu_sys: f64,
    cpu_idle: f64,
    load0: f64,
    load1: f64,
    load2: f64,
    disk_ro_rate: f64,
    disk_wo_rate: f64,
    disk_rb_rate: f64,
    disk_wb_rate: f64,
    net_rp_rate: f64,
    net_wp_rate: f64,
    net_rb_rate: f64,
    net_wb_rate: f64,
}

impl HostSystem {
    fn emit(&self, sink: &mut MetricSink) {
        let host = [self.hostname.as_str()];

        for (desc, value) in [
            (&MEM_TOTAL, self.mem_total),
            (&MEM_USED, self.mem_used),
            (&MEM_ACTUAL_USED, self.mem_actual_used),
            (&MEM_ACTUAL_FREE, self.mem_actual_free),
            (&SWAP_TOTAL, self.swap_total),
            (&SWAP_USED, self.swap_used),
            (&SWAP_PAGE_IN, self.swap_page_in),
            (&SWAP_PAGE_OUT, self.swap_page_out),
            (&CPU_USER, self.cpu_user),
            (&CPU_SYS, self.cpu_sys),
            (&CPU_IDLE, self.cpu_idle),
            (&LOAD_1M, self.load0),
            (&LOAD_5M, self.load1),
            (&LOAD_15M, self.load2),
            (&DISK_RO_RATE, self.disk_ro_rate),
            (&DISK_WO_RATE, self.disk_wo_rate),
            (&DISK_RB_RATE, self.disk_rb_rate),
            (&DISK_WB_RATE, self.disk_wb_rate),
            (&NET_RP_RATE, self.net_rp_rate),
            (&NET_WP_RATE, self.net_wp_rate),
            (&NET_RB_RATE, self.net_rb_rate),
            (&NET_WB_RATE, self.net_wb_rate),
        ] {
            sink.emit(desc, value, &host);
        }
    }
}

impl Scraper for SystemScraper {
    fn name(&self) -> &'static str {
        "system"
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "system", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        _version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let rows = fetch_gpperfmon(conn, "system", SYSTEM_SQL).await?;

            decode_rows(
                &rows,
                |row| HostSystem::from_row(row).map_err(Error::from),
                |host| host.emit(sink),
            )
            .into_result()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(hostname: &str) -> HostSystem {
        HostSystem {
            hostname: hostname.to_string(),
            mem_total: 64.0,
            mem_used: 32.0,
            mem_actual_used: 16.0,
            mem_actual_free: 48.0,
            swap_total: 8.0,
            swap_used: 0.0,
            swap_page_in: 0.0,
            swap_page_out: 0.0,
            cpu_user: 12.5,
            cpu_sys: 2.5,
            cpu_idle: 85.0,
            load0: 0.5,
            load1: 0.75,
            load2: 1.25,
            disk_ro_rate: 1.0,
            disk_wo_rate: 2.0,
            disk_rb_rate: 3.0,
            disk_wb_rate: 4.0,
            net_rp_rate: 5.0,
            net_wp_rate: 6.0,
            net_rb_rate: 7.0,
            net_wb_rate: 8.0,
        }
    }

    #[test]
    fn test_system_scraper_name() {
        let scraper = SystemScraper::new();
        assert_eq!(scraper.name(), "system");
        assert!(!scraper.enabled_by_default());
    }

    #[test]
    fn test_every_gauge_is_labelled_by_host() {
        let mut sink = MetricSink::new();
        host("sdw1").emit(&mut sink);
        host("sdw2").emit(&mut sink);

        assert_eq!(sink.len(), 44);
        assert!(sink.samples().iter().all(|s| s.label("hostname").is_some()));
    }

    #[test]
    fn test_load_averages_map_to_windows() {
        let mut sink = MetricSink::new();
        host("mdw").emit(&mut sink);

        let fifteen = sink.find("greenplum_node_cpu_avg_usage_15m_percent").next();
        assert!(fifteen.is_some_and(|s| (s.value() - 1.25).abs() < f64::EPSILON));
    }
}
