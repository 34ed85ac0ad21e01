// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end scenarios mirroring the read/write suite the log-structured
//! directory was ported from, parameterized over both sector sizes its
//! `layout_256`/`layout_4096` fixtures covered.

use stratafs::directory_chain::{AttributeRequest, OpenFileConfig};
use stratafs::{Filesystem, FsConfig};
use stratafs_ram::{RamBufferPool, RamDevice};

type Fs = Filesystem<RamDevice, RamBufferPool, stratafs_ram::RamAllocator>;

fn new_medium(sector_size: usize) -> RamDevice {
    RamDevice::new(sector_size)
}

fn open(device: &RamDevice) -> Fs {
    Filesystem::new(device.clone(), device.buffer_pool(), device.allocator(), FsConfig::default())
}

const HELLO: &str = "Hello, world! How are you?";

#[test]
fn read_inline_write_256() {
    read_inline_write(256);
}

#[test]
fn read_inline_write_4096() {
    read_inline_write(4096);
}

fn read_inline_write(sector_size: usize) {
    let device = new_medium(sector_size);

    let mut fs = open(&device);
    fs.format().unwrap();
    fs.touch("data.txt").unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut appender = fs.open_appender(found).unwrap();
    appender.write(HELLO.as_bytes()).unwrap();
    appender.close().unwrap();
    drop(fs);

    let mut fs = open(&device);
    fs.mount().unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut reader = fs.open_reader(found).unwrap();
    let mut buffer = [0u8; 256];
    let n = reader.read(&mut buffer).unwrap();
    assert_eq!(n, HELLO.len());
    assert_eq!(&buffer[..n], HELLO.as_bytes());
    assert_eq!(reader.cursor(), HELLO.len() as u64);
}

#[test]
fn read_inline_write_multiple_same_block_256() {
    read_inline_write_multiple_same_block(256);
}

#[test]
fn read_inline_write_multiple_same_block_4096() {
    read_inline_write_multiple_same_block(4096);
}

fn read_inline_write_multiple_same_block(sector_size: usize) {
    let device = new_medium(sector_size);

    let mut fs = open(&device);
    fs.format().unwrap();
    fs.touch("data.txt").unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut appender = fs.open_appender(found).unwrap();
    for _ in 0..3 {
        appender.write(HELLO.as_bytes()).unwrap();
    }
    appender.close().unwrap();
    drop(fs);

    let mut fs = open(&device);
    fs.mount().unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut reader = fs.open_reader(found).unwrap();
    let mut buffer = [0u8; 256];
    let n = reader.read(&mut buffer).unwrap();
    assert_eq!(n, HELLO.len() * 3);
    assert_eq!(&buffer[..n], HELLO.repeat(3).as_bytes());
    assert_eq!(reader.cursor(), (HELLO.len() * 3) as u64);
}

#[test]
fn read_inline_write_multiple_separate_blocks_256() {
    read_inline_write_multiple_separate_blocks(256);
}

#[test]
fn read_inline_write_multiple_separate_blocks_4096() {
    read_inline_write_multiple_separate_blocks(4096);
}

fn read_inline_write_multiple_separate_blocks(sector_size: usize) {
    let device = new_medium(sector_size);

    let mut fs = open(&device);
    fs.format().unwrap();
    fs.touch("data.txt").unwrap();
    for _ in 0..3 {
        let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
        let mut appender = fs.open_appender(found).unwrap();
        appender.write(HELLO.as_bytes()).unwrap();
        appender.close().unwrap();
    }
    drop(fs);

    let mut fs = open(&device);
    fs.mount().unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut reader = fs.open_reader(found).unwrap();
    let mut buffer = [0u8; 256];
    let n = reader.read(&mut buffer).unwrap();
    assert_eq!(n, HELLO.len() * 3);
    assert_eq!(reader.cursor(), (HELLO.len() * 3) as u64);
}

#[test]
fn read_data_chain_two_blocks_256() {
    read_data_chain_two_blocks(256);
}

#[test]
fn read_data_chain_two_blocks_4096() {
    read_data_chain_two_blocks(4096);
}

fn read_data_chain_two_blocks(sector_size: usize) {
    let device = new_medium(sector_size);
    let writes = 2 * sector_size / HELLO.len();

    let mut fs = open(&device);
    fs.format().unwrap();
    fs.touch("data.txt").unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut appender = fs.open_appender(found).unwrap();
    for _ in 0..writes {
        appender.write(HELLO.as_bytes()).unwrap();
    }
    assert!(appender.has_chain(), "expected promotion to a data chain by now");
    appender.close().unwrap();
    drop(fs);

    let mut fs = open(&device);
    fs.mount().unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut reader = fs.open_reader(found).unwrap();
    let mut out = Vec::new();
    let mut buffer = [0u8; 64];
    loop {
        let n = reader.read(&mut buffer).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buffer[..n]);
    }
    assert_eq!(out.len(), writes * HELLO.len());
    assert_eq!(out, HELLO.repeat(writes).as_bytes());
}

#[test]
fn read_many_small_writes_spanning_sectors_256() {
    read_many_small_writes_spanning_sectors(256);
}

#[test]
fn read_many_small_writes_spanning_sectors_4096() {
    read_many_small_writes_spanning_sectors(4096);
}

fn read_many_small_writes_spanning_sectors(sector_size: usize) {
    let device = new_medium(sector_size);

    let mut fs = open(&device);
    fs.format().unwrap();
    fs.touch("data.txt").unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut appender = fs.open_appender(found).unwrap();
    for _ in 0..100 {
        appender.write(HELLO.as_bytes()).unwrap();
    }
    appender.close().unwrap();
    drop(fs);

    let mut fs = open(&device);
    fs.mount().unwrap();
    let found = fs.find("data.txt", &OpenFileConfig::default()).unwrap().unwrap();
    let mut reader = fs.open_reader(found).unwrap();
    let mut out = Vec::new();
    let mut buffer = [0u8; 128];
    loop {
        let n = reader.read(&mut buffer).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buffer[..n]);
    }
    assert_eq!(out.len(), 100 * HELLO.len());
    assert_eq!(reader.cursor(), (100 * HELLO.len()) as u64);
}

#[test]
fn unlink_then_find_is_absent_256() {
    unlink_then_find_is_absent(256);
}

#[test]
fn unlink_then_find_is_absent_4096() {
    unlink_then_find_is_absent(4096);
}

fn unlink_then_find_is_absent(sector_size: usize) {
    let device = new_medium(sector_size);

    let mut fs = open(&device);
    fs.format().unwrap();
    fs.touch("a").unwrap();
    let found = fs.find("a", &OpenFileConfig::default()).unwrap().unwrap();
    let mut appender = fs.open_appender(found).unwrap();
    appender.write(b"some data").unwrap();
    appender.close().unwrap();
    fs.unlink("a").unwrap();
    drop(fs);

    let mut fs = open(&device);
    fs.mount().unwrap();
    let found = fs.find("a", &OpenFileConfig::default()).unwrap();
    assert!(found.is_none());
}

#[test]
fn unlink_then_touch_resurrects_256() {
    unlink_then_touch_resurrects(256);
}

fn unlink_then_touch_resurrects(sector_size: usize) {
    let device = new_medium(sector_size);

    let mut fs = open(&device);
    fs.format().unwrap();
    fs.touch("a").unwrap();
    let found = fs.find("a", &OpenFileConfig::default()).unwrap().unwrap();
    let mut appender = fs.open_appender(found).unwrap();
    appender.write(b"old").unwrap();
    appender.close().unwrap();
    fs.unlink("a").unwrap();

    fs.touch("a").unwrap();
    let found = fs.find("a", &OpenFileConfig::default()).unwrap().unwrap();
    assert_eq!(found.directory_size, 0);
    let mut appender = fs.open_appender(found).unwrap();
    appender.write(b"new").unwrap();
    appender.close().unwrap();

    let found = fs.find("a", &OpenFileConfig::default()).unwrap().unwrap();
    let mut reader = fs.open_reader(found).unwrap();
    let mut buf = [0u8; 16];
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"new");
}

#[test]
fn attribute_round_trip_256() {
    attribute_round_trip(256);
}

#[test]
fn attribute_round_trip_4096() {
    attribute_round_trip(4096);
}

fn attribute_round_trip(sector_size: usize) {
    let device = new_medium(sector_size);

    let mut fs = open(&device);
    fs.format().unwrap();
    let id = fs.touch("data.txt").unwrap();
    fs.file_attribute(id, 1, &0xCAFEBABEu32.to_le_bytes()).unwrap();
    drop(fs);

    let mut fs = open(&device);
    fs.mount().unwrap();
    let cfg = OpenFileConfig {
        attributes: vec![AttributeRequest { attr_type: 1, size: 4 }],
    };
    let found = fs.find("data.txt", &cfg).unwrap().unwrap();
    assert_eq!(found.attributes.len(), 1);
    assert_eq!(found.attributes[0].value, 0xCAFEBABEu32.to_le_bytes());
}
