// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
// Only for writing convenient doctests

use tempfile::NamedTempFile;
pub fn generate_example_yaml() -> NamedTempFile {
    use std::io::BufWriter;
    use std::io::Write;

    let file = NamedTempFile::new().expect("Unable to create named temporary file");

    {
        let mut f = BufWriter::new(&file);
        let data = concat!(
            "testbed:\n",
            "  duts:\n",
            "    - id: dut\n",
            "      ports:\n",
            "        - id: port1\n",
            "        - id: port2\n",
            "kne:\n",
            "  topology: /tmp/topology.pb.txt\n",
        );
        f.write_all(data.as_bytes()).expect("Unable to write data");
        f.flush().expect("Flush failed");
    }

    file
}
