// Integration test harness crate; everything lives under tests/.
