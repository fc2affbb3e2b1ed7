/// Integration tests: a real server and a real client talking over stdio
mod process_tests;
mod session_tests;
