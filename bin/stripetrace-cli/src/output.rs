//! Record dumps

use anyhow::Result;
use std::io::Write;
use stripetrace_common::Counter;
use stripetrace_runtime::StripeRuntime;

/// Print every record in array order
pub fn write_text<W: Write>(out: &mut W, runtime: &StripeRuntime) -> Result<()> {
    for (position, record) in runtime.records().enumerate() {
        writeln!(
            out,
            "File {position:2} (record {}, rank {})",
            record.id(),
            record.rank()
        )?;
        for counter in Counter::ALL {
            writeln!(
                out,
                "  Counter {:2} {}: {}",
                counter.index(),
                counter,
                record.counter(counter)
            )?;
        }
        for (stripe, ost) in record.ost_ids().enumerate() {
            writeln!(out, "  Stripe {stripe:2}: {ost}")?;
        }
    }
    Ok(())
}

/// Print one JSON object per record in array order
pub fn write_json<W: Write>(out: &mut W, runtime: &StripeRuntime) -> Result<()> {
    for record in runtime.records() {
        serde_json::to_writer(&mut *out, &record.summary())?;
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripetrace_common::{Rank, RuntimeConfig};
    use stripetrace_runtime::StripeLayout;

    fn runtime() -> StripeRuntime {
        let mut rt = StripeRuntime::new(RuntimeConfig::with_budget(1000)).unwrap();
        let layout = StripeLayout::new(1 << 20, 4, vec![4, 5])
            .unwrap()
            .with_totals(8, 1);
        rt.ingest_layout(&layout, Rank::new(3)).unwrap();
        rt
    }

    #[test]
    fn test_text_dump() {
        let mut out = Vec::new();
        write_text(&mut out, &runtime()).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "File  0 (record 0, rank 3)");
        assert_eq!(lines[1], "  Counter  0 LUSTRE_OSTS: 8");
        assert_eq!(lines[5], "  Counter  4 LUSTRE_STRIPE_WIDTH: 2");
        assert_eq!(lines[6], "  Stripe  0: 4");
        assert_eq!(lines[7], "  Stripe  1: 5");
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn test_json_dump() {
        let mut out = Vec::new();
        write_json(&mut out, &runtime()).unwrap();
        let text = String::from_utf8(out).unwrap();

        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["rank"], 3);
        assert_eq!(value["stripe_width"], 2);
        assert_eq!(value["ost_ids"], serde_json::json!([4, 5]));
    }
}
