// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F1 flash algorithms.

use static_assertions::const_assert;
use swdburner_core::flash::{FlashAlgorithm, SectorInfo, SyscallFrame};

const STM32F10X_1024_CODE: [u32; 125] = [
    0xE00ABE00, 0x49710CC0, 0x600804C0, 0x48702200,
    0x60024970, 0x4A706041, 0x64416042, 0x69C06442,
    0xD4080741, 0xF245486D, 0x60025255, 0x60412106,
    0x73FFF640, 0x20006083, 0x48694770, 0xF0416801,
    0x60010180, 0xF0426C02, 0x64020280, 0x47702000,
    0x4864B510, 0xF0416841, 0x60410104, 0x22AAF64A,
    0xF0416841, 0x60410140, 0xE000495C, 0x6803600A,
    0xD4FB07DC, 0xF0236843, 0x60430304, 0xF0436C43,
    0x64430304, 0xF0436C43, 0x64430340, 0x600AE000,
    0x07DC6C03, 0x6C41D4FB, 0x0104F021, 0x20006441,
    0xB530BD10, 0x4A4D4C49, 0x494E6825, 0x2500F505,
    0xF64A42A8, 0xD21223AA, 0xF044684C, 0x604C0402,
    0x68486088, 0x0040F040, 0xE0006048, 0x68086013,
    0xD4FB07C4, 0xF0206848, 0x60480002, 0x6C4CE011,
    0x0402F044, 0x6488644C, 0xF0406C48, 0x64480040,
    0x6013E000, 0x07C46C08, 0x6C48D4FB, 0x0002F020,
    0x20006448, 0xB530BD30, 0x4B364C30, 0x1C496825,
    0x00490849, 0x2500F505, 0xD21D42A8, 0x1C80E002,
    0x1E891C92, 0x685CB381, 0x0401F044, 0x8815605C,
    0x681C8005, 0xD4FC07E5, 0x0864685C, 0x605C0064,
    0xF015681D, 0xD0EA0F14, 0xF0406818, 0x60180014,
    0x1C80E018, 0x1E891C92, 0x6C5CB1B1, 0x0401F044,
    0x8815645C, 0x6C1C8005, 0xD4FC07E5, 0x08646C5C,
    0x645C0064, 0xF0146C1C, 0xD0EA0F14, 0xF0406C18,
    0x64180014, 0xBD302001, 0xBD302000, 0x0003B5E0,
    0x35FFF04F, 0x2600D00F, 0x5D98E00B, 0x20084045,
    0x07ED086F, 0xBF44463D, 0x407D4F0F, 0xD1F71E40,
    0x428E1C76, 0x6812D3F1, 0x30FFF04F, 0x42AA4045,
    0x4618D001, 0x18C8BDE0, 0x0000BDE0, 0x00000400,
    0x40022000, 0x45670123, 0xCDEF89AB, 0x40003000,
    0x40022010, 0x4002200C, 0xEDB88320, 0x47702000,
    0x00000000,
];

const_assert!(STM32F10X_1024_CODE.len() * 4 <= 0x400);

const STM32F10X_1024_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x800, 0x000000),
];

/// STM32F10x_1024
pub static STM32F10X_1024: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F10x_1024",
    init: 0x20000005,
    uninit: Some(0x2000003B),
    erase_chip: 0x20000051,
    erase_sector: 0x200000A3,
    program_page: 0x20000107,
    verify: Some(0x2000018D),
    set_read_protect: Some(0x200001ED),
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000800,
        stack_pointer: 0x20000C00,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F10X_1024_CODE,
    sectors: &STM32F10X_1024_SECTORS,
};

const STM32F10X_512_CODE: [u32; 76] = [
    0xE00ABE00, 0x4603B510, 0x4C442000, 0x48446020,
    0x48446060, 0x46206060, 0xF01069C0, 0xD1080F04,
    0x5055F245, 0x60204C40, 0x60602006, 0x70FFF640,
    0x200060A0, 0x4601BD10, 0x69004838, 0x0080F040,
    0x61104A36, 0x47702000, 0x69004834, 0x0004F040,
    0x61084932, 0x69004608, 0x0040F040, 0xE0036108,
    0x20AAF64A, 0x60084930, 0x68C0482C, 0x0F01F010,
    0x482AD1F6, 0xF0206900, 0x49280004, 0x20006108,
    0x46014770, 0x69004825, 0x0002F040, 0x61104A23,
    0x61414610, 0xF0406900, 0x61100040, 0xF64AE003,
    0x4A2120AA, 0x481D6010, 0xF01068C0, 0xD1F60F01,
    0x6900481A, 0x0002F020, 0x61104A18, 0x47702000,
    0x4603B510, 0xF0201C48, 0xE0220101, 0x69004813,
    0x0001F040, 0x61204C11, 0x80188810, 0x480FBF00,
    0xF01068C0, 0xD1FA0F01, 0x6900480C, 0x0001F020,
    0x61204C0A, 0x68C04620, 0x0F14F010, 0x4620D006,
    0xF04068C0, 0x60E00014, 0xBD102001, 0x1C921C9B,
    0x29001E89, 0x2000D1DA, 0x0000E7F7, 0x40022000,
    0x45670123, 0xCDEF89AB, 0x40003000, 0x00000000,
];

const_assert!(STM32F10X_512_CODE.len() * 4 <= 0x400);

const STM32F10X_512_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x800, 0x000000),
];

/// STM32F10x_512
pub static STM32F10X_512: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F10x_512",
    init: 0x20000005,
    uninit: Some(0x20000037),
    erase_chip: 0x20000049,
    erase_sector: 0x20000083,
    program_page: 0x200000C1,
    verify: None,
    set_read_protect: None,
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000800,
        stack_pointer: 0x20000C00,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F10X_512_CODE,
    sectors: &STM32F10X_512_SECTORS,
};

const STM32F10X_128_1K_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x400, 0x000000),
];

/// STM32F10x_128_1K
pub static STM32F10X_128_1K: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F10x_128_1K",
    init: 0x20000005,
    uninit: Some(0x20000037),
    erase_chip: 0x20000049,
    erase_sector: 0x20000083,
    program_page: 0x200000C1,
    verify: None,
    set_read_protect: None,
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000800,
        stack_pointer: 0x20000C00,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F10X_512_CODE,
    sectors: &STM32F10X_128_1K_SECTORS,
};

const STM32F10X_OPT_CODE: [u32; 103] = [
    0xE00ABE00, 0x4603B510, 0x4C5E2000, 0x485E6020,
    0x485E6060, 0x485C6060, 0x485C60A0, 0x462060A0,
    0xF01069C0, 0xD1080F04, 0x5055F245, 0x60204C58,
    0x60602006, 0x70FFF640, 0x200060A0, 0x4601BD10,
    0x69004850, 0x7080F420, 0x61104A4E, 0x69004610,
    0x0080F040, 0x20006110, 0x484A4770, 0xF0406900,
    0x49480020, 0x46086108, 0xF0406900, 0x61080040,
    0xF64AE003, 0x494620AA, 0x48426008, 0xF01068C0,
    0xD1F60F01, 0x6900483F, 0x0020F020, 0x6108493D,
    0x69004608, 0x0010F040, 0xF6456108, 0x493D20A5,
    0xE0038008, 0x20AAF64A, 0x60084939, 0x68C04835,
    0x0F01F010, 0x4833D1F6, 0xF0206900, 0x49310010,
    0x46086108, 0xF01068C0, 0xD0060F14, 0x68C04608,
    0x0014F040, 0x200160C8, 0x20004770, 0x4601E7FC,
    0x69004828, 0x0020F040, 0x61104A26, 0x69004610,
    0x0040F040, 0xE0036110, 0x20AAF64A, 0x60104A24,
    0x68C04820, 0x0F01F010, 0x481ED1F6, 0xF0206900,
    0x4A1C0020, 0x20006110, 0x46034770, 0x47702001,
    0x4603B510, 0xF0201C48, 0xE0260101, 0x69004815,
    0x0010F040, 0x61204C13, 0x80188810, 0xF64AE003,
    0x4C1320AA, 0x480F6020, 0xF01068C0, 0xD1F60F01,
    0x6900480C, 0x0010F020, 0x61204C0A, 0x68C04620,
    0x0F14F010, 0x4620D006, 0xF04068C0, 0x60E00014,
    0xBD102001, 0x1C921C9B, 0x29001E89, 0x2000D1D6,
    0x0000E7F7, 0x40022000, 0x45670123, 0xCDEF89AB,
    0x40003000, 0x1FFFF800, 0x00000000,
];

const_assert!(STM32F10X_OPT_CODE.len() * 4 <= 0x400);

const STM32F10X_OPT_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x10, 0x000000),
];

/// STM32F10x_OPT
pub static STM32F10X_OPT: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F10x_OPT",
    init: 0x20000005,
    uninit: Some(0x2000003F),
    erase_chip: 0x2000005B,
    erase_sector: 0x200000DF,
    program_page: 0x20000121,
    verify: None,
    set_read_protect: None,
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000C00,
        stack_pointer: 0x20001000,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F10X_OPT_CODE,
    sectors: &STM32F10X_OPT_SECTORS,
};
